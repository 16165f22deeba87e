pub type Result<T> = std::result::Result<T, crate::error::Error>;

/// Fails with `InvalidLayout` naming the violated condition when `$expr` is false.
#[macro_export]
macro_rules! verify_layout {
    ($name:expr, $expr:expr) => {{
        let result = $expr;
        $crate::result::verify_layout(result, stringify!($name), stringify!($expr))?;
    }};
}

#[inline]
pub fn verify_layout(predicate: bool, name: &str, condition: &str) -> Result<()> {
    if predicate {
        Ok(())
    } else {
        invalid_layout(name, condition)
    }
}

#[cold]
pub fn invalid_layout(name: &str, condition: &str) -> Result<()> {
    Err(crate::error::ErrorKind::InvalidLayout {
        message: format!("{name}: {condition}"),
    }
    .into())
}
