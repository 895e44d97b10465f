//! Parser for the plain-text network resource format.
//!
//! ```text
//! <free text>
//! #
//! <nnin>
//! <min> <max>        (nnin times)
//! <nnout>
//! <min> <max>        (nnout times)
//! <free text>
//! $
//! #planes=<n> <s0> ... <s(n-1)>
//! bias <l+1> <s(l+1)>   followed by s(l+1) values,  for l in 0..n-1
//! wgt <l> <s(l)> <s(l+1)>  followed by s(l+1) * s(l) values, row-major
//! ```
//!
//! Numbers may be separated by any whitespace.
use std::str::FromStr;

use nalgebra::{DMatrix, DVector};

use super::{NetworkDefinition, Range};

struct Tokens<'a> {
    rest: &'a str,
}

impl<'a> Tokens<'a> {
    fn next(&mut self) -> Option<&'a str> {
        let trimmed = self.rest.trim_start();
        if trimmed.is_empty() {
            self.rest = trimmed;
            return None;
        }
        let end = trimmed
            .find(char::is_whitespace)
            .unwrap_or(trimmed.len());
        let (token, rest) = trimmed.split_at(end);
        self.rest = rest;
        Some(token)
    }

    fn number<T: FromStr>(&mut self, what: &str) -> Result<T, String> {
        let token = self
            .next()
            .ok_or_else(|| format!("truncated while reading {}", what))?;
        token
            .parse()
            .map_err(|_| format!("unparsable {} {:?}", what, token))
    }

    fn keyword(&mut self, keyword: &str) -> Result<(), String> {
        match self.next() {
            Some(token) if token == keyword => Ok(()),
            Some(token) => Err(format!("expected {:?}, found {:?}", keyword, token)),
            None => Err(format!("truncated before {:?}", keyword)),
        }
    }

    /// Skip everything up to and including the first `marker`.
    fn skip_past(&mut self, marker: char) -> Result<(), String> {
        let at = self
            .rest
            .find(marker)
            .ok_or_else(|| format!("missing {:?} marker", marker))?;
        self.rest = &self.rest[at + marker.len_utf8()..];
        Ok(())
    }

    fn ranges(&mut self, what: &str) -> Result<Vec<Range>, String> {
        let count: usize = self.number(&format!("{} count", what))?;
        (0..count)
            .map(|i| {
                let min = self.number(&format!("{} {} min", what, i))?;
                let max = self.number(&format!("{} {} max", what, i))?;
                Ok(Range::new(min, max))
            })
            .collect()
    }

    fn values(&mut self, count: usize, what: &str) -> Result<Vec<f64>, String> {
        (0..count).map(|_| self.number(what)).collect()
    }

    fn planes_header(&mut self) -> Result<usize, String> {
        let token = self
            .next()
            .ok_or_else(|| "truncated before plane header".to_string())?;
        let count = ["#planes=", "planes="]
            .iter()
            .find_map(|prefix| token.strip_prefix(prefix))
            .ok_or_else(|| format!("expected \"#planes=\", found {:?}", token))?;
        if count.is_empty() {
            self.number("plane count")
        } else {
            count
                .parse()
                .map_err(|_| format!("unparsable plane count {:?}", count))
        }
    }
}

fn expect_id(what: &str, found: usize, expected: usize) -> Result<(), String> {
    if found == expected {
        Ok(())
    } else {
        Err(format!("inconsistent {}: {} instead of {}", what, found, expected))
    }
}

pub(super) fn parse(text: &str) -> Result<NetworkDefinition, String> {
    let mut tokens = Tokens { rest: text };

    tokens.skip_past('#')?;
    let input_ranges = tokens.ranges("input")?;
    let output_ranges = tokens.ranges("output")?;

    tokens.skip_past('$')?;
    let planes = tokens.planes_header()?;
    if planes < 2 {
        return Err(format!("need at least two planes, got {}", planes));
    }
    let layer_sizes = (0..planes)
        .map(|_| tokens.number("plane size"))
        .collect::<Result<Vec<usize>, _>>()?;

    let mut biases = Vec::with_capacity(planes - 1);
    for l in 0..planes - 1 {
        tokens.keyword("bias")?;
        expect_id("bias plane", tokens.number("bias plane")?, l + 1)?;
        expect_id("bias size", tokens.number("bias size")?, layer_sizes[l + 1])?;
        biases.push(DVector::from_vec(tokens.values(layer_sizes[l + 1], "bias")?));
    }

    let mut weights = Vec::with_capacity(planes - 1);
    for l in 0..planes - 1 {
        let (rows, cols) = (layer_sizes[l + 1], layer_sizes[l]);
        tokens.keyword("wgt")?;
        expect_id("weight plane", tokens.number("weight plane")?, l)?;
        expect_id("weight source size", tokens.number("weight source size")?, cols)?;
        expect_id("weight target size", tokens.number("weight target size")?, rows)?;
        let values = tokens.values(rows * cols, "weight")?;
        weights.push(DMatrix::from_row_slice(rows, cols, &values));
    }

    let definition = NetworkDefinition {
        layer_sizes,
        input_ranges,
        output_ranges,
        biases,
        weights,
    };
    match definition.inconsistency() {
        Some(reason) => Err(reason),
        None => Ok(definition),
    }
}
