/// Bail out of an operator's `setup`/`reshape` with an error naming the operator.
///
/// The first argument is anything exposing `name()` and `op_type()` (every
/// `OpBase`).
macro_rules! op_ensure {
    ($base:expr, $cond:expr, $($arg:tt)+) => {
        if !$cond {
            return Err($crate::utils::error::ShadowError::operator(
                $base.name(),
                $base.op_type(),
                format!($($arg)+),
            ));
        }
    };
}

pub(crate) use op_ensure;
