use super::Relu;

/// An element-wise activation applied at the output of a layer.
#[derive(Debug, Clone)]
pub enum ActFn {
    Relu(Relu),
}

impl ActFn {
    pub fn relu() -> Self {
        Self::Relu(Relu)
    }

    pub fn f(&self, x: f32) -> f32 {
        match self {
            Self::Relu(a) => a.f(x),
        }
    }

    /// The derivative evaluated at the pre-activation value `x`.
    pub fn df(&self, x: f32) -> f32 {
        match self {
            Self::Relu(a) => a.df(x),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relu_clamps_negatives() {
        let relu = ActFn::relu();
        assert_eq!(relu.f(-2.0), 0.0);
        assert_eq!(relu.f(3.0), 3.0);
        assert_eq!(relu.df(-2.0), 0.0);
        assert_eq!(relu.df(3.0), 1.0);
    }
}
