pub type Result<T> = std::result::Result<T, crate::error::Error>;

#[macro_export]
macro_rules! verify_arg {
    ($name:expr, $expr:expr) => {{
        let result = $expr;
        $crate::result::verify_arg(result, stringify!($name), stringify!($expr))?;
    }};
}

#[macro_export]
macro_rules! verify_invariant {
    ($expr:expr) => {{
        let result = $expr;
        $crate::result::verify_invariant(result, stringify!($expr))?;
    }};
}

#[inline]
pub fn verify_arg(predicate: bool, name: &str, condition: &str) -> Result<()> {
    if predicate {
        Ok(())
    } else {
        invalid_arg(name, condition)
    }
}

/// Checks a user-supplied index against `len`.
#[inline]
pub fn verify_index(index: usize, len: usize) -> Result<()> {
    if index < len {
        Ok(())
    } else {
        index_out_of_bounds(index, len)
    }
}

#[inline]
pub fn verify_invariant(predicate: bool, condition: &str) -> Result<()> {
    if predicate {
        Ok(())
    } else {
        invariant_violation(condition)
    }
}

#[cold]
pub fn invalid_arg(name: &str, condition: &str) -> Result<()> {
    Err(crate::error::Error::invalid_arg(name, condition))
}

#[cold]
pub fn index_out_of_bounds(index: usize, len: usize) -> Result<()> {
    Err(crate::error::Error::index_out_of_bounds(index, len))
}

#[cold]
pub fn invariant_violation(condition: &str) -> Result<()> {
    Err(crate::error::Error::invariant(condition))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn checked(len: usize) -> Result<usize> {
        verify_arg!(len, len > 0);
        verify_invariant!(len < 100);
        Ok(len)
    }

    #[test]
    fn test_verify_index() {
        assert!(verify_index(0, 1).is_ok());
        assert!(verify_index(1, 1).unwrap_err().is_out_of_bounds());
        assert!(verify_index(usize::MAX, 10).unwrap_err().is_out_of_bounds());
        assert!(verify_index(0, 0).is_err());
    }

    #[test]
    fn test_verify_macros() {
        assert_eq!(checked(5).unwrap(), 5);
        assert!(matches!(
            checked(0).unwrap_err().kind(),
            ErrorKind::InvalidArgument { .. }
        ));
        assert!(matches!(
            checked(200).unwrap_err().kind(),
            ErrorKind::InvariantViolation { .. }
        ));
    }
}
