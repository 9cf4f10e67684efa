/// Immutable point-of-equivalence between a clock and its parent, plus
/// a linear error-growth model.
///
/// Two correlations are equal iff all four fields are numerically
/// equal. Correlations are never mutated in place; `but_with` returns
/// a new value differing only in the fields supplied.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Correlation {
    pub parent_time: f64,
    pub child_time: f64,
    pub initial_error: f64,
    pub error_growth_rate: f64,
}

impl Correlation {
    /// Four positional scalars, the canonical constructor.
    pub fn new(
        parent_time: f64,
        child_time: f64,
        initial_error: f64,
        error_growth_rate: f64,
    ) -> Self {
        Self {
            parent_time,
            child_time,
            initial_error,
            error_growth_rate,
        }
    }

    /// A new correlation with any subset of fields replaced. Supplying
    /// no overrides returns an equal value.
    pub fn but_with(&self, overrides: CorrelationOverrides) -> Self {
        Self {
            parent_time: overrides.parent_time.unwrap_or(self.parent_time),
            child_time: overrides.child_time.unwrap_or(self.child_time),
            initial_error: overrides.initial_error.unwrap_or(self.initial_error),
            error_growth_rate: overrides
                .error_growth_rate
                .unwrap_or(self.error_growth_rate),
        }
    }
}

/// Partial field set for [`Correlation::but_with`]. Unlike the
/// original dynamically-typed overload set, an unknown field cannot
/// be expressed here at all — the type system rejects it at compile
/// time rather than at call time, which is the strict variant spec
/// §4.1 asks implementations to prefer.
#[derive(Debug, Clone, Copy, Default)]
pub struct CorrelationOverrides {
    pub parent_time: Option<f64>,
    pub child_time: Option<f64>,
    pub initial_error: Option<f64>,
    pub error_growth_rate: Option<f64>,
}

impl CorrelationOverrides {
    pub fn parent_time(mut self, v: f64) -> Self {
        self.parent_time = Some(v);
        self
    }

    pub fn child_time(mut self, v: f64) -> Self {
        self.child_time = Some(v);
        self
    }

    pub fn initial_error(mut self, v: f64) -> Self {
        self.initial_error = Some(v);
        self
    }

    pub fn error_growth_rate(mut self, v: f64) -> Self {
        self.error_growth_rate = Some(v);
        self
    }
}

/// Single scalar interpreted as `parentTime`, the remaining fields
/// defaulting to zero.
impl From<f64> for Correlation {
    fn from(parent_time: f64) -> Self {
        Self {
            parent_time,
            ..Default::default()
        }
    }
}

impl From<(f64,)> for Correlation {
    fn from((parent_time,): (f64,)) -> Self {
        Self::from(parent_time)
    }
}

impl From<(f64, f64)> for Correlation {
    fn from((parent_time, child_time): (f64, f64)) -> Self {
        Self {
            parent_time,
            child_time,
            ..Default::default()
        }
    }
}

impl From<(f64, f64, f64)> for Correlation {
    fn from((parent_time, child_time, initial_error): (f64, f64, f64)) -> Self {
        Self {
            parent_time,
            child_time,
            initial_error,
            ..Default::default()
        }
    }
}

impl From<(f64, f64, f64, f64)> for Correlation {
    fn from(
        (parent_time, child_time, initial_error, error_growth_rate): (f64, f64, f64, f64),
    ) -> Self {
        Self::new(parent_time, child_time, initial_error, error_growth_rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_all_zero() {
        assert_eq!(Correlation::default(), Correlation::new(0.0, 0.0, 0.0, 0.0));
    }

    #[test]
    fn single_scalar_is_parent_time() {
        let c: Correlation = 42.0.into();
        assert_eq!(c.parent_time, 42.0);
        assert_eq!(c.child_time, 0.0);
    }

    #[test]
    fn tuple_constructors_fill_left_to_right() {
        let c: Correlation = (1.0, 2.0).into();
        assert_eq!(c, Correlation::new(1.0, 2.0, 0.0, 0.0));

        let c4: Correlation = (1.0, 2.0, 3.0, 4.0).into();
        assert_eq!(c4, Correlation::new(1.0, 2.0, 3.0, 4.0));
    }

    #[test]
    fn but_with_replaces_only_supplied_fields() {
        let base = Correlation::new(50.0, 300.0, 0.0, 0.0);
        let updated = base.but_with(CorrelationOverrides::default().child_time(320.0));
        assert_eq!(updated, Correlation::new(50.0, 320.0, 0.0, 0.0));
    }

    #[test]
    fn but_with_no_overrides_is_identity() {
        let base = Correlation::new(1.0, 2.0, 3.0, 4.0);
        assert_eq!(base.but_with(CorrelationOverrides::default()), base);
    }

    #[test]
    fn equality_is_structural() {
        assert_eq!(Correlation::new(1.0, 2.0, 3.0, 4.0), (1.0, 2.0, 3.0, 4.0).into());
        assert_ne!(Correlation::new(1.0, 2.0, 3.0, 4.0), Correlation::new(1.0, 2.0, 3.0, 5.0));
    }
}
