use log::info;
use nalgebra::DVector;

use crate::config::{ConfigError, InitialValueKind, InitialValueParams};
use crate::discretization::dofs::DofMap;
use crate::discretization::mesh::Mesh;
use crate::error::PecletError;
use crate::physics::functions::{ConstantFunction, ExtrapolatedField, FieldFunction};
use crate::processing::persistence::{FieldHandle, Persistence};

/// Source of the field at `t = 0`.
#[derive(Debug)]
pub enum InitialValueProvider {
    /// A closed-form function, evaluated at `t = 0`.
    ClosedForm(FieldFunction),
    /// The final field of an earlier run, extended linearly past its ends.
    Restart(ExtrapolatedField),
}

impl InitialValueProvider {
    pub fn closed_form(mut function: FieldFunction) -> Self {
        function.set_time(0.0);
        InitialValueProvider::ClosedForm(function)
    }

    pub fn from_params(
        params: &InitialValueParams,
        store: &dyn Persistence,
    ) -> Result<Self, PecletError> {
        match params.function_name {
            InitialValueKind::Parsed => Ok(Self::closed_form(FieldFunction::parse(
                &params.parsed_function,
            )?)),
            InitialValueKind::Constant => {
                let value = params.function_double_arguments.first().copied().ok_or_else(|| {
                    ConfigError::Invalid {
                        section: "initial_values",
                        reason: "constant initial value needs one double argument".to_string(),
                    }
                })?;
                Ok(Self::closed_form(FieldFunction::Constant(
                    ConstantFunction::new(value),
                )))
            }
            InitialValueKind::InterpolateOldField => {
                let handle = FieldHandle::new(&params.field_file);
                let (_, dofs, solution) = store.load_field(&handle)?;
                info!(
                    "Restarting from {} ({} nodes)",
                    handle.path().display(),
                    dofs.n_dofs()
                );
                Ok(InitialValueProvider::Restart(ExtrapolatedField::from_dofs(
                    &dofs, &solution,
                )?))
            }
        }
    }

    pub fn value(&self, x: f64) -> f64 {
        match self {
            InitialValueProvider::ClosedForm(f) => f.value(x),
            InitialValueProvider::Restart(field) => field.value(x),
        }
    }

    pub fn interpolate(&self, dofs: &DofMap) -> DVector<f64> {
        dofs.interpolate(|x| self.value(x))
    }

    /// A restart field must overlap the new mesh.
    pub fn check_overlap(&self, mesh: &Mesh) -> Result<(), PecletError> {
        let InitialValueProvider::Restart(field) = self else {
            return Ok(());
        };
        let (a, b) = field.bounds();
        let (c, d) = mesh.bounds();
        if a < d && c < b {
            Ok(())
        } else {
            Err(PecletError::RestartMismatch {
                field: (a, b),
                mesh: (c, d),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExpressionParams;
    use crate::processing::persistence::PersistenceError;

    struct NoStore;

    impl Persistence for NoStore {
        fn save_field(
            &mut self,
            _mesh: &Mesh,
            _dofs: &DofMap,
            _solution: &DVector<f64>,
        ) -> Result<FieldHandle, PersistenceError> {
            unreachable!()
        }

        fn load_field(
            &self,
            _handle: &FieldHandle,
        ) -> Result<(Mesh, DofMap, DVector<f64>), PersistenceError> {
            let mesh = Mesh::from_cells(&[(0.0, 0.5, 1), (0.5, 1.0, 1)])?;
            let dofs = DofMap::distribute(&mesh);
            Ok((mesh, dofs, DVector::from_vec(vec![0.0, 1.0, 2.0])))
        }
    }

    #[test]
    fn closed_form_is_evaluated_at_time_zero() {
        let params = InitialValueParams {
            parsed_function: ExpressionParams::new("x + 10*t + 1"),
            ..InitialValueParams::default()
        };
        let provider = InitialValueProvider::from_params(&params, &NoStore).unwrap();
        assert_eq!(provider.value(2.0), 3.0);
    }

    #[test]
    fn constant_needs_an_argument() {
        let params = InitialValueParams {
            function_name: InitialValueKind::Constant,
            ..InitialValueParams::default()
        };
        assert!(matches!(
            InitialValueProvider::from_params(&params, &NoStore),
            Err(PecletError::Configuration(ConfigError::Invalid {
                section: "initial_values",
                ..
            }))
        ));

        let params = InitialValueParams {
            function_name: InitialValueKind::Constant,
            function_double_arguments: vec![4.5],
            ..InitialValueParams::default()
        };
        let provider = InitialValueProvider::from_params(&params, &NoStore).unwrap();
        assert_eq!(provider.value(-3.0), 4.5);
    }

    #[test]
    fn restart_extrapolates_onto_larger_mesh() {
        let params = InitialValueParams {
            function_name: InitialValueKind::InterpolateOldField,
            ..InitialValueParams::default()
        };
        let provider = InitialValueProvider::from_params(&params, &NoStore).unwrap();
        let mesh = Mesh::interval(-0.5, 1.5).unwrap();
        provider.check_overlap(&mesh).unwrap();
        let values = provider.interpolate(&DofMap::distribute(&mesh));
        assert_eq!(values.as_slice(), &[-1.0, 3.0]);
    }

    #[test]
    fn disjoint_restart_field_is_rejected() {
        let params = InitialValueParams {
            function_name: InitialValueKind::InterpolateOldField,
            ..InitialValueParams::default()
        };
        let provider = InitialValueProvider::from_params(&params, &NoStore).unwrap();
        let mesh = Mesh::interval(2.0, 3.0).unwrap();
        assert!(matches!(
            provider.check_overlap(&mesh),
            Err(PecletError::RestartMismatch { .. })
        ));
    }
}
