//! Evaluation mode and branch targets threaded through expression generation.

/// What an expression visit leaves in the accumulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalMode {
    /// The expression's value.
    Value,
    /// The address of the storage the expression names. Only variables, fields and array
    /// elements have one.
    Address,
}

/// Where a boolean expression branches instead of producing 0 or 1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchTarget {
    pub label: String,
    /// Jump when the condition is true; otherwise jump when it is false.
    pub when_true: bool,
}

impl BranchTarget {
    pub fn if_true(label: &str) -> Self {
        Self {
            label: label.to_string(),
            when_true: true,
        }
    }

    pub fn if_false(label: &str) -> Self {
        Self {
            label: label.to_string(),
            when_true: false,
        }
    }

    /// The same label with the opposite polarity.
    pub fn negated(&self) -> Self {
        Self {
            label: self.label.clone(),
            when_true: !self.when_true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negation() {
        let t = BranchTarget::if_true(".Lbody_0");
        assert_eq!(t.negated(), BranchTarget::if_false(".Lbody_0"));
        assert_eq!(t.negated().negated(), t);
    }
}
