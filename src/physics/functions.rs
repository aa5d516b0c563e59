//! Scalar fields of position and time used for coefficients, sources,
//! boundary data, initial values and exact solutions.

use std::collections::BTreeMap;
use std::fmt;

use nalgebra::DVector;
use thiserror::Error;

use crate::config::{ConfigError, ExpressionParams};
use crate::discretization::dofs::DofMap;

#[derive(Debug, Error, PartialEq)]
pub enum FieldError {
    #[error("a field needs at least two nodes, got {0}")]
    TooFewNodes(usize),
    #[error("{nodes} nodes but {values} values")]
    LengthMismatch { nodes: usize, values: usize },
    #[error("nodes are not strictly increasing at index {0}")]
    Unsorted(usize),
}

/// A function of `x` that can carry a current time.
#[derive(Debug)]
pub enum FieldFunction {
    Parsed(ParsedFunction),
    Constant(ConstantFunction),
    Extrapolated(ExtrapolatedField),
}

impl FieldFunction {
    pub fn value(&self, x: f64) -> f64 {
        match self {
            FieldFunction::Parsed(f) => f.value(x),
            FieldFunction::Constant(f) => f.value,
            FieldFunction::Extrapolated(f) => f.value(x),
        }
    }

    /// Only parsed expressions depend on time.
    pub fn set_time(&mut self, t: f64) {
        if let FieldFunction::Parsed(f) = self {
            f.time = t;
        }
    }

    pub fn parse(params: &ExpressionParams) -> Result<Self, ConfigError> {
        Ok(FieldFunction::Parsed(ParsedFunction::from_params(params)?))
    }
}

impl From<f64> for FieldFunction {
    fn from(value: f64) -> Self {
        FieldFunction::Constant(ConstantFunction::new(value))
    }
}

/// An expression in `x` and `t`, compiled once.
pub struct ParsedFunction {
    expression: String,
    compiled: Box<dyn Fn(f64, f64) -> f64>,
    time: f64,
}

impl ParsedFunction {
    pub fn new(expression: &str, constants: &BTreeMap<String, f64>) -> Result<Self, ConfigError> {
        let invalid = |reason: String| ConfigError::Expression {
            expression: expression.to_string(),
            reason,
        };
        let parsed: meval::Expr = expression.parse().map_err(|e: meval::Error| invalid(e.to_string()))?;
        let mut context = meval::Context::new();
        for (name, &value) in constants {
            context.var(name.clone(), value);
        }
        let compiled = parsed
            .bind2_with_context(context, "x", "t")
            .map_err(|e| invalid(e.to_string()))?;
        Ok(Self {
            expression: expression.to_string(),
            compiled: Box::new(compiled),
            time: 0.0,
        })
    }

    pub fn from_params(params: &ExpressionParams) -> Result<Self, ConfigError> {
        Self::new(&params.function_expression, &params.function_constants)
    }

    pub fn value(&self, x: f64) -> f64 {
        (self.compiled)(x, self.time)
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }
}

impl fmt::Debug for ParsedFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParsedFunction")
            .field("expression", &self.expression)
            .field("time", &self.time)
            .finish()
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ConstantFunction {
    pub value: f64,
}

impl ConstantFunction {
    pub fn new(value: f64) -> Self {
        Self { value }
    }

    /// Heat flux through a melt film of thickness `film_thickness` between a
    /// wall at `wall_temperature` and the melting front.
    pub fn melt_film(
        conductivity: f64,
        wall_temperature: f64,
        melt_temperature: f64,
        film_thickness: f64,
    ) -> Result<Self, ConfigError> {
        if !(film_thickness > 0.0) {
            return Err(ConfigError::Invalid {
                section: "boundary_conditions",
                reason: format!("melt film thickness must be positive, got {film_thickness}"),
            });
        }
        Ok(Self::new(
            conductivity * (wall_temperature - melt_temperature) / film_thickness,
        ))
    }
}

/// Piecewise-linear field on sorted nodes. Outside the node range the
/// nearest cell's line is extended.
#[derive(Clone, Debug, PartialEq)]
pub struct ExtrapolatedField {
    nodes: Vec<f64>,
    values: Vec<f64>,
}

impl ExtrapolatedField {
    pub fn new(nodes: Vec<f64>, values: Vec<f64>) -> Result<Self, FieldError> {
        if nodes.len() != values.len() {
            return Err(FieldError::LengthMismatch {
                nodes: nodes.len(),
                values: values.len(),
            });
        }
        if nodes.len() < 2 {
            return Err(FieldError::TooFewNodes(nodes.len()));
        }
        if let Some(i) = nodes.windows(2).position(|w| !(w[1] > w[0])) {
            return Err(FieldError::Unsorted(i + 1));
        }
        Ok(Self { nodes, values })
    }

    pub fn from_dofs(dofs: &DofMap, solution: &DVector<f64>) -> Result<Self, FieldError> {
        Self::new(dofs.support_points().to_vec(), solution.iter().copied().collect())
    }

    pub fn value(&self, x: f64) -> f64 {
        let n = self.nodes.len();
        let k = match self.nodes.partition_point(|&p| p <= x) {
            0 => 0,
            i if i >= n => n - 2,
            i => i - 1,
        };
        let (x0, x1) = (self.nodes[k], self.nodes[k + 1]);
        let s = (x - x0) / (x1 - x0);
        self.values[k] + s * (self.values[k + 1] - self.values[k])
    }

    pub fn bounds(&self) -> (f64, f64) {
        (self.nodes[0], self.nodes[self.nodes.len() - 1])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parsed_function_tracks_time() {
        let mut f = FieldFunction::parse(&ExpressionParams::new("x^2 + 2*t")).unwrap();
        assert_eq!(f.value(3.0), 9.0);
        f.set_time(0.5);
        assert_eq!(f.value(3.0), 10.0);
    }

    #[test]
    fn parsed_function_uses_constants() {
        let params = ExpressionParams {
            function_expression: "a*exp(-t)*sin(pi*x)".into(),
            function_constants: BTreeMap::from([("a".to_string(), 2.0)]),
        };
        let f = ParsedFunction::from_params(&params).unwrap();
        assert!((f.value(0.5) - 2.0).abs() < 1e-14);
        assert_eq!(f.expression(), "a*exp(-t)*sin(pi*x)");
    }

    #[test]
    fn unknown_variable_is_a_config_error() {
        let err = ParsedFunction::new("x + y", &BTreeMap::new()).unwrap_err();
        assert!(matches!(err, ConfigError::Expression { .. }));
        assert!(ParsedFunction::new("x +* 1", &BTreeMap::new()).is_err());
    }

    #[test]
    fn melt_film_flux() {
        let f = ConstantFunction::melt_film(2.0, 10.0, 4.0, 0.5).unwrap();
        assert_eq!(f.value, 24.0);
        assert!(ConstantFunction::melt_film(2.0, 10.0, 4.0, 0.0).is_err());
    }

    #[test]
    fn extrapolation_extends_end_cells() {
        let field = ExtrapolatedField::new(vec![0.0, 1.0, 2.0], vec![0.0, 1.0, 3.0]).unwrap();
        assert_eq!(field.value(0.5), 0.5);
        assert_eq!(field.value(1.5), 2.0);
        assert_eq!(field.value(2.0), 3.0);
        assert_eq!(field.value(-1.0), -1.0);
        assert_eq!(field.value(3.0), 5.0);
        assert_eq!(field.bounds(), (0.0, 2.0));
    }

    #[test]
    fn malformed_fields_are_rejected() {
        assert_eq!(
            ExtrapolatedField::new(vec![0.0], vec![1.0]),
            Err(FieldError::TooFewNodes(1))
        );
        assert_eq!(
            ExtrapolatedField::new(vec![0.0, 1.0, 1.0], vec![0.0; 3]),
            Err(FieldError::Unsorted(2))
        );
        assert!(matches!(
            ExtrapolatedField::new(vec![0.0, 1.0], vec![0.0]),
            Err(FieldError::LengthMismatch { .. })
        ));
    }
}
