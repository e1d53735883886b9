use serde::{Deserialize, Serialize};

/// A declared method's argument/result shape, used in place of a
/// type-level serializable filter (design note 9: "the type-level
/// serializable predicate is replaced by a run-time schema for each
/// method"). `Unknown` is the escape hatch for values the registrant
/// declines to constrain further.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum TypeShape {
    Null,
    Bool,
    Number,
    String,
    Array { of: Box<TypeShape> },
    Object { fields: Vec<(String, TypeShape)> },
    Unknown,
    /// Rejected: a `Date`/timestamp-object is not plain JSON.
    Date,
    /// Rejected: a typed array (e.g. `Uint8Array`) is not a JSON array.
    TypedArray,
    /// Rejected: functions cannot cross the wire.
    Function,
    /// Rejected: symbols have no JSON representation.
    Symbol,
    /// Rejected: bigint is not representable in JSON without precision loss.
    BigInt,
}

/// Recursively check that `shape` contains none of the non-serializable
/// leaves. Mirrors the client-side type filter's descent into object and
/// array types.
pub fn is_json_safe(shape: &TypeShape) -> bool {
    match shape {
        TypeShape::Null
        | TypeShape::Bool
        | TypeShape::Number
        | TypeShape::String
        | TypeShape::Unknown => true,
        TypeShape::Array { of } => is_json_safe(of),
        TypeShape::Object { fields } => fields.iter().all(|(_, field)| is_json_safe(field)),
        TypeShape::Date | TypeShape::TypedArray | TypeShape::Function | TypeShape::Symbol | TypeShape::BigInt => false,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MethodSchema {
    pub args: Vec<TypeShape>,
    pub result: TypeShape,
}

impl MethodSchema {
    pub fn is_json_safe(&self) -> bool {
        self.args.iter().all(is_json_safe) && is_json_safe(&self.result)
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_object_is_json_safe() {
        let shape = TypeShape::Object {
            fields: vec![
                ("id".to_string(), TypeShape::String),
                ("count".to_string(), TypeShape::Number),
            ],
        };
        assert!(is_json_safe(&shape));
    }

    #[test]
    fn date_anywhere_in_the_tree_is_rejected() {
        let shape = TypeShape::Object {
            fields: vec![("createdAt".to_string(), TypeShape::Date)],
        };
        assert!(!is_json_safe(&shape));

        let nested = TypeShape::Array {
            of: Box::new(TypeShape::Object {
                fields: vec![("ts".to_string(), TypeShape::Date)],
            }),
        };
        assert!(!is_json_safe(&nested));
    }

    #[test]
    fn typed_array_function_symbol_bigint_are_rejected() {
        for shape in [
            TypeShape::TypedArray,
            TypeShape::Function,
            TypeShape::Symbol,
            TypeShape::BigInt,
        ] {
            assert!(!is_json_safe(&shape));
        }
    }

    #[test]
    fn unknown_is_an_escape_hatch() {
        assert!(is_json_safe(&TypeShape::Unknown));
    }

    #[test]
    fn method_schema_rejects_if_any_arg_unsafe() {
        let schema = MethodSchema {
            args: vec![TypeShape::String, TypeShape::Date],
            result: TypeShape::Bool,
        };
        assert!(!schema.is_json_safe());
    }
}
