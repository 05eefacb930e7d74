//! Implicit casts
//!
//! Every place a value meets a statically expected type goes through
//! [`BuildContext::cast`]: the pair of type categories selects one conversion
//! rule. A pair without a rule is an unsupported lowering.

use crate::context::BuildContext;
use crate::error::{SemanticError, SemanticResult};
use crate::object_model::DescId;
use crate::types::{ValueTypeId, ValueTypeKind, ValueTypeTable};
use crate::value::{CastKind, SemanticsValue, ValueKind};

/// Conversion-relevant category of a value type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Category {
    /// Unboxed primitive
    Value,
    String,
    /// `any`, `generic` and unresolved type parameters
    Any,
    Union,
    Object,
    /// `null` and `undefined`
    Nullish,
    Void,
}

fn category(types: &ValueTypeTable, ty: ValueTypeId) -> Category {
    match types.kind(ty) {
        ValueTypeKind::Void | ValueTypeKind::Never => Category::Void,
        ValueTypeKind::Null | ValueTypeKind::Undefined => Category::Nullish,
        ValueTypeKind::String | ValueTypeKind::RawString => Category::String,
        ValueTypeKind::Any | ValueTypeKind::Generic | ValueTypeKind::TypeParameter => Category::Any,
        ValueTypeKind::Union => Category::Union,
        ValueTypeKind::Object
        | ValueTypeKind::Interface
        | ValueTypeKind::Array
        | ValueTypeKind::Function
        | ValueTypeKind::Tuple
        | ValueTypeKind::ClosureContext => Category::Object,
        ValueTypeKind::Boolean
        | ValueTypeKind::Int
        | ValueTypeKind::Number
        | ValueTypeKind::Enum
        | ValueTypeKind::Namespace => Category::Value,
    }
}

/// Conversion rule for a pair of categories; `Ok(None)` retypes in place
fn rule(from: Category, to: Category) -> Result<Option<CastKind>, ()> {
    use Category::*;
    Ok(Some(match (from, to) {
        (_, Void) => return Ok(None),
        (String, String) | (Any, Any) | (Union, Union) | (Nullish, Object) | (Nullish, Nullish) => {
            return Ok(None)
        }
        // union values share the boxed representation of `any`
        (Any, Union) => return Ok(None),
        (Value, Value) | (String, Value) | (Nullish, Value) => CastKind::ValueToValue,
        (Value, String) | (Nullish, String) => CastKind::ValueToString,
        (Value, Any) | (String, Any) | (Nullish, Any) => CastKind::ValueToAny,
        (Value, Union) | (String, Union) | (Nullish, Union) => CastKind::ValueToUnion,
        (Object, Any) => CastKind::ObjectToAny,
        (Object, Union) => CastKind::ObjectToUnion,
        (Object, Value) => CastKind::ObjectToValue,
        (Object, String) => CastKind::ObjectToString,
        (Object, Object) => CastKind::ObjectToObject,
        (Any, Value) | (Any, String) => CastKind::AnyToValue,
        (Any, Object) => CastKind::AnyToObject,
        (Union, Value) | (Union, String) => CastKind::UnionToValue,
        (Union, Object) => CastKind::UnionToObject,
        (Union, Any) => CastKind::UnionToAny,
        _ => return Err(()),
    }))
}

impl BuildContext<'_> {
    /// Convert `value` to the expected type `to`
    pub(crate) fn cast(&mut self, value: SemanticsValue, to: ValueTypeId) -> SemanticResult<SemanticsValue> {
        if value.ty == to {
            return Ok(value);
        }
        let from_cat = category(&self.types, value.ty);
        let to_cat = category(&self.types, to);
        let kind = rule(from_cat, to_cat).map_err(|()| {
            SemanticError::unsupported(format!(
                "conversion from {} to {}",
                self.types.display(value.ty),
                self.types.display(to)
            ))
        })?;
        match kind {
            None => Ok(value.retyped(to)),
            Some(CastKind::ObjectToObject) => self.cast_object(value, to),
            Some(kind) => Ok(wrap(kind, value, to)),
        }
    }

    /// Object to object: same layout retypes, an upcast along the base chain
    /// drops the shape, any other pair reads through a compatibility shape
    fn cast_object(&mut self, value: SemanticsValue, to: ValueTypeId) -> SemanticResult<SemanticsValue> {
        let source = self.objects.description_of(&self.types, value.ty);
        let target = self.objects.description_of(&self.types, to);
        let (Some(source), Some(target)) = (source, target) else {
            return Ok(value.retyped(to));
        };
        let source_root = self.objects.layout_root(source);
        let target_root = self.objects.layout_root(target);
        if source_root == target_root {
            return Ok(value.retyped(to));
        }
        if self.is_ancestor(target_root, source_root) {
            return Ok(value.retyped(to).with_shape(None));
        }

        let known = value
            .shape
            .or(self.objects.description(source_root).this_shape)
            .map(|s| self.objects.shape(s).is_static())
            .unwrap_or(false);
        let shape = if known {
            self.objects.build_shape(target_root, source_root)?
        } else {
            match self.objects.description(target_root).this_shape {
                Some(shape) => shape,
                None => {
                    return Err(SemanticError::internal(format!(
                        "description `{}` has no shapes",
                        self.objects.description(target_root).name
                    )))
                }
            }
        };
        tracing::debug!(
            source = %source_root,
            target = %target_root,
            shape = %shape,
            static_source = known,
            "object conversion"
        );
        Ok(wrap(CastKind::ObjectToObject, value, to).with_shape(Some(shape)))
    }

    fn is_ancestor(&self, ancestor: DescId, desc: DescId) -> bool {
        let mut current = self.objects.description(desc).base;
        while let Some(base) = current {
            if base == ancestor {
                return true;
            }
            current = self.objects.description(base).base;
        }
        false
    }
}

fn wrap(kind: CastKind, value: SemanticsValue, to: ValueTypeId) -> SemanticsValue {
    let location = value.location;
    SemanticsValue::new(
        ValueKind::Cast {
            kind,
            value: Box::new(value),
        },
        to,
    )
    .with_location(location)
}
