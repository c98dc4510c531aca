//! Named variable banks.

#![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

use cuebank_core::{Error, Result, RpcVariable};

/// An ordered set of variables looked up by name or curve index.
///
/// Banks hold a handful of entries, so lookups are linear scans.
#[derive(Debug, Clone, Default)]
pub struct VariableBank {
    vars: Vec<RpcVariable>,
}

impl VariableBank {
    pub fn new(vars: Vec<RpcVariable>) -> Self {
        Self { vars }
    }

    fn find(&self, name: &str) -> Option<usize> {
        self.vars.iter().position(|v| v.name == name)
    }

    /// Index of a publicly accessible variable.
    fn public_index(&self, name: &str) -> Result<usize> {
        if name.is_empty() {
            return Err(Error::InvalidArgument("variable name is empty".to_string()));
        }
        self.find(name)
            .filter(|&i| self.vars[i].is_public)
            .ok_or_else(|| Error::NotFound(format!("variable '{name}'")))
    }

    /// Current value of the variable at a curve index.
    pub fn value_at(&self, index: usize) -> Option<f32> {
        self.vars.get(index).map(RpcVariable::value)
    }

    pub fn get(&self, name: &str) -> Result<f32> {
        let i = self.public_index(name)?;
        Ok(self.vars[i].value())
    }

    /// Set a public variable; the value is clamped into its range.
    pub fn set(&mut self, name: &str, value: f32) -> Result<()> {
        let i = self.public_index(name)?;
        self.vars[i].set_value(value);
        Ok(())
    }

    /// Set a variable regardless of visibility. Used for the values the
    /// runtime maintains itself.
    pub(crate) fn set_internal(&mut self, name: &str, value: f32) -> Result<()> {
        let i = self
            .find(name)
            .ok_or_else(|| Error::NotFound(format!("variable '{name}'")))?;
        self.vars[i].set_value(value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cuebank_core::DISTANCE_VARIABLE;

    fn bank() -> VariableBank {
        VariableBank::new(vec![
            RpcVariable::new("Speed", 10.0, 0.0, 100.0),
            RpcVariable::reserved(DISTANCE_VARIABLE),
        ])
    }

    #[test]
    fn test_get_set_clamps() {
        let mut bank = bank();
        assert_eq!(bank.get("Speed").unwrap(), 10.0);

        bank.set("Speed", 250.0).unwrap();
        assert_eq!(bank.get("Speed").unwrap(), 100.0);
        assert_eq!(bank.value_at(0), Some(100.0));
    }

    #[test]
    fn test_lookup_errors() {
        let mut bank = bank();
        assert!(matches!(bank.get(""), Err(Error::InvalidArgument(_))));
        assert!(matches!(bank.set("Missing", 1.0), Err(Error::NotFound(_))));
        assert!(matches!(bank.get(DISTANCE_VARIABLE), Err(Error::NotFound(_))));
        assert!(matches!(bank.set(DISTANCE_VARIABLE, 3.0), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_internal_access_ignores_visibility() {
        let mut bank = bank();
        bank.set_internal(DISTANCE_VARIABLE, 12.5).unwrap();
        assert_eq!(bank.value_at(1), Some(12.5));
        assert_eq!(bank.value_at(2), None);
    }
}
