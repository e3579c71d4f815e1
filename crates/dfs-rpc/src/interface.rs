//! Remote interface descriptors.
//!
//! A remote interface is a marker type naming the interface and listing its
//! operations. Servers check incoming calls against the table; stubs stamp
//! outgoing calls from it.

use crate::error::{RemoteFailure, RpcError, RpcResult};

/// One remote operation: a name plus the type names of its arguments.
///
/// Two operations may share a name as long as their argument types differ.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Operation {
    pub name: &'static str,
    pub arg_types: &'static [&'static str],
}

impl Operation {
    pub const fn new(name: &'static str, arg_types: &'static [&'static str]) -> Self {
        Self { name, arg_types }
    }

    /// Whether a request's name and argument types select this operation.
    pub fn matches(&self, name: &str, arg_types: &[String]) -> bool {
        self.name == name
            && self.arg_types.len() == arg_types.len()
            && self.arg_types.iter().zip(arg_types).all(|(a, b)| *a == b)
    }

    /// `name(A, B)` form used in logs and errors.
    pub fn signature(&self) -> String {
        format!("{}({})", self.name, self.arg_types.join(", "))
    }
}

/// A remote interface.
///
/// `Error` is what every operation of the interface fails with. The
/// [`RemoteFailure`] bound is what guarantees each operation can report a
/// transport failure to its caller.
pub trait Interface: Send + Sync + 'static {
    const NAME: &'static str;
    const OPERATIONS: &'static [Operation];

    type Error: RemoteFailure;

    /// Find the operation a request names.
    fn resolve(name: &str, arg_types: &[String]) -> Option<&'static Operation> {
        Self::OPERATIONS.iter().find(|op| op.matches(name, arg_types))
    }
}

/// Check that an interface descriptor can be served.
pub fn validate<I: Interface>() -> RpcResult<()> {
    if I::NAME.is_empty() {
        return Err(RpcError::structural("<unnamed>", "interface has no name"));
    }
    if I::OPERATIONS.is_empty() {
        return Err(RpcError::structural(I::NAME, "interface declares no operations"));
    }

    for (i, op) in I::OPERATIONS.iter().enumerate() {
        if op.name.is_empty() {
            return Err(RpcError::structural(I::NAME, format!("operation #{i} has no name")));
        }
        let duplicate = I::OPERATIONS[..i]
            .iter()
            .any(|earlier| earlier.name == op.name && earlier.arg_types == op.arg_types);
        if duplicate {
            return Err(RpcError::structural(
                I::NAME,
                format!("operation {} declared twice", op.signature()),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Good;
    impl Interface for Good {
        const NAME: &'static str = "Good";
        const OPERATIONS: &'static [Operation] = &[
            Operation::new("get", &["u32"]),
            Operation::new("get", &["String"]),
        ];
        type Error = RpcError;
    }

    struct Empty;
    impl Interface for Empty {
        const NAME: &'static str = "Empty";
        const OPERATIONS: &'static [Operation] = &[];
        type Error = RpcError;
    }

    struct Twice;
    impl Interface for Twice {
        const NAME: &'static str = "Twice";
        const OPERATIONS: &'static [Operation] = &[
            Operation::new("put", &["u32"]),
            Operation::new("put", &["u32"]),
        ];
        type Error = RpcError;
    }

    #[test]
    fn test_overloads_resolve_by_arg_types() {
        validate::<Good>().unwrap();
        let by_int = Good::resolve("get", &["u32".to_string()]).unwrap();
        let by_str = Good::resolve("get", &["String".to_string()]).unwrap();
        assert_eq!(by_int.arg_types, &["u32"]);
        assert_eq!(by_str.arg_types, &["String"]);
        assert!(Good::resolve("get", &[]).is_none());
        assert!(Good::resolve("put", &["u32".to_string()]).is_none());
    }

    #[test]
    fn test_empty_interface_is_structural() {
        assert!(matches!(validate::<Empty>(), Err(RpcError::Structural { .. })));
    }

    #[test]
    fn test_duplicate_operation_is_structural() {
        let err = validate::<Twice>().unwrap_err();
        assert!(err.to_string().contains("put(u32)"));
    }
}
