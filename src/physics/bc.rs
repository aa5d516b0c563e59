use std::collections::VecDeque;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::config::{BoundaryConditionParams, ConfigError};
use crate::discretization::mesh::BoundaryId;
use crate::physics::functions::{ConstantFunction, FieldFunction, ParsedFunction};

/// How a boundary condition enters the discrete system.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundaryKind {
    /// Prescribed flux, added to the right hand side.
    Natural,
    /// Prescribed value, imposed on the matrix rows.
    Strong,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundaryFunctionName {
    Constant,
    Parsed,
    MeltFilm,
}

impl BoundaryFunctionName {
    /// How many entries of the shared argument list the function consumes.
    pub fn argument_count(self) -> usize {
        match self {
            BoundaryFunctionName::Constant => 1,
            BoundaryFunctionName::Parsed => 0,
            BoundaryFunctionName::MeltFilm => 4,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BoundaryFunctionName::Constant => "constant",
            BoundaryFunctionName::Parsed => "parsed",
            BoundaryFunctionName::MeltFilm => "melt_film",
        }
    }
}

#[derive(Debug)]
pub struct BoundaryDescriptor {
    pub id: BoundaryId,
    pub kind: BoundaryKind,
    pub function: FieldFunction,
}

/// Resolved boundary conditions, one descriptor per boundary ID.
#[derive(Debug, Default)]
pub struct BoundaryConditionSet {
    descriptors: Vec<BoundaryDescriptor>,
}

impl BoundaryConditionSet {
    pub fn new(descriptors: Vec<BoundaryDescriptor>) -> Self {
        Self { descriptors }
    }

    /// Pair up implementation types and function names by boundary ID.
    ///
    /// Function arguments come from one shared list, taken front to back in
    /// ID order. Every parsed boundary gets its own compiled copy of the
    /// shared expression.
    pub fn resolve(
        params: &BoundaryConditionParams,
        boundary_count: usize,
    ) -> Result<Self, ConfigError> {
        let types = &params.implementation_types;
        let names = &params.function_names;
        if types.len() != boundary_count || names.len() != boundary_count {
            return Err(ConfigError::BoundaryCountMismatch {
                implementation_types: types.len(),
                function_names: names.len(),
                boundaries: boundary_count,
            });
        }

        let mut arguments: VecDeque<f64> =
            params.function_double_arguments.iter().copied().collect();
        let mut descriptors = Vec::with_capacity(boundary_count);

        for (index, (&kind, &name)) in types.iter().zip(names).enumerate() {
            let id = index as BoundaryId;
            let needed = name.argument_count();
            if arguments.len() < needed {
                return Err(ConfigError::ArgumentUnderflow {
                    boundary: id,
                    function: name.as_str(),
                    needed,
                    available: arguments.len(),
                });
            }
            let args: Vec<f64> = arguments.drain(..needed).collect();
            let function = match name {
                BoundaryFunctionName::Constant => {
                    FieldFunction::Constant(ConstantFunction::new(args[0]))
                }
                BoundaryFunctionName::MeltFilm => FieldFunction::Constant(
                    ConstantFunction::melt_film(args[0], args[1], args[2], args[3])?,
                ),
                BoundaryFunctionName::Parsed => {
                    FieldFunction::Parsed(ParsedFunction::from_params(&params.parsed_function)?)
                }
            };
            descriptors.push(BoundaryDescriptor { id, kind, function });
        }

        if !arguments.is_empty() {
            warn!(
                "{} boundary function argument(s) left unused: {:?}",
                arguments.len(),
                arguments
            );
        }

        Ok(Self { descriptors })
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    pub fn find(&self, id: BoundaryId) -> Option<&BoundaryDescriptor> {
        self.descriptors.iter().find(|d| d.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &BoundaryDescriptor> {
        self.descriptors.iter()
    }

    /// Descriptors of one kind, mutable so their time can be advanced.
    pub fn of_kind_mut(
        &mut self,
        kind: BoundaryKind,
    ) -> impl Iterator<Item = &mut BoundaryDescriptor> {
        self.descriptors.iter_mut().filter(move |d| d.kind == kind)
    }
}
