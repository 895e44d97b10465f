//! Damping of the normal equations and its adaptation.
//!
//! The damped system is
//! ```math
//!   (\mathbf{J}^\top\mathbf{J} + \mu\mathbf{I})\Delta\vec{p} = \mathbf{J}^\top\vec{e}.
//! ```
//! After an accepted step `$\mu$` follows Nielsen's rule based on the gain
//! ratio between actual and predicted reduction.

/// Damping factor `$\mu$` together with its growth factor `$\nu$`.
#[derive(Copy, Clone, Debug, PartialEq)]
pub(crate) struct Damping {
    pub mu: f64,
    nu: u32,
}

/// `$\nu$` would overflow, the system stays unsolvable however it is damped.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) struct Overflow;

impl Damping {
    /// Initial damping.
    ///
    /// Unbounded problems start from `$\tau\max_i(\mathbf{J}^\top\mathbf{J})_{ii}$`,
    /// bounded ones from `$\frac{1}{2}\tau\|\vec{e}\|^2$`.
    pub fn initial(tau: f64, max_diag: f64, bounded: bool, residuals_norm_squared: f64) -> Self {
        let mu = if bounded {
            0.5 * tau * residuals_norm_squared
        } else {
            tau * max_diag.max(f64::MIN_POSITIVE)
        };
        Self { mu, nu: 2 }
    }

    /// The damped system could not be solved: `$\mu \gets \mu\nu$`, `$\nu \gets 2\nu$`.
    pub fn increase(&mut self) -> Result<(), Overflow> {
        self.mu *= f64::from(self.nu);
        self.nu = self.nu.checked_mul(2).ok_or(Overflow)?;
        Ok(())
    }

    /// A step `dp` reduced `$\|\vec{e}\|^2$` by `actual`.
    ///
    /// `jte` is `$\mathbf{J}^\top\vec{e}$` at the old point.
    pub fn accept<'a>(
        &mut self,
        dp: impl IntoIterator<Item = &'a f64>,
        jte: impl IntoIterator<Item = &'a f64>,
        actual: f64,
        new_norm_squared: f64,
    ) {
        let predicted: f64 = dp
            .into_iter()
            .zip(jte)
            .map(|(d, g)| d * (self.mu * d + g))
            .sum();
        if predicted > 0.0 {
            let ratio = 2.0 * actual / predicted - 1.0;
            let shrink = 1.0 - ratio * ratio * ratio;
            self.mu *= shrink.max(1.0 / 3.0);
        } else {
            self.mu = self.mu.min(0.1 * new_norm_squared);
        }
        self.nu = 2;
    }
}
