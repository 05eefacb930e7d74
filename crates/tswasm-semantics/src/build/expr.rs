//! Expression lowering

use tswasm_frontend::{BinaryOp, Binding, Expr, ExprKind, ScopeId, TypeId, UnaryOp};

use crate::context::{BuildContext, RefMode, SymbolValue};
use crate::error::{LookupKind, SemanticError, SemanticResult};
use crate::flatten::LocalAllocator;
use crate::nodes::{FuncId, VarId};
use crate::object_model::{AccessMode, DescId, MemberAccess};
use crate::types::{EnumMember, ValueTypeId, ValueTypeKind};
use crate::value::{ElementKind, Literal, SemanticsValue, ValueKind};

impl BuildContext<'_> {
    /// Lower one expression. Failures are reported at the innermost
    /// expression carrying a source position.
    pub(crate) fn build_expr(&mut self, expr: &Expr) -> SemanticResult<SemanticsValue> {
        let value = self.build_expr_kind(expr).map_err(|e| match expr.span {
            Some(span) => e.located(&self.file, span, expr),
            None => e,
        })?;
        if self.config.source_map && value.location.is_none() {
            return Ok(value.with_location(expr.span));
        }
        Ok(value)
    }

    /// Lower an expression and convert it to `ty`
    pub(crate) fn build_expr_as(&mut self, expr: &Expr, ty: ValueTypeId) -> SemanticResult<SemanticsValue> {
        let value = self.build_expr(expr)?;
        self.cast(value, ty)
    }

    pub(crate) fn build_condition(&mut self, expr: &Expr) -> SemanticResult<SemanticsValue> {
        self.build_expr_as(expr, ValueTypeId::BOOLEAN)
    }

    fn build_expr_kind(&mut self, expr: &Expr) -> SemanticResult<SemanticsValue> {
        let ty = self.value_type(expr.ty)?;
        match &expr.kind {
            ExprKind::Identifier(name) => self.build_identifier(name),
            ExprKind::Int(v) => Ok(SemanticsValue::literal(Literal::Int(*v))),
            ExprKind::Number(v) => Ok(SemanticsValue::literal(Literal::Number(*v))),
            ExprKind::String(s) => Ok(SemanticsValue::literal(Literal::String(s.clone()))),
            ExprKind::Bool(b) => Ok(SemanticsValue::literal(Literal::Boolean(*b))),
            ExprKind::Null => Ok(SemanticsValue::literal(Literal::Null)),
            ExprKind::Undefined => Ok(SemanticsValue::literal(Literal::Undefined)),
            ExprKind::ObjectLiteral(fields) => self.build_object_literal(fields, ty),
            ExprKind::ArrayLiteral(items) => {
                let element = self.types.array_element(ty).unwrap_or(ValueTypeId::ANY);
                let items = self.build_items(items, element)?;
                Ok(SemanticsValue::new(
                    ValueKind::NewArray {
                        element,
                        len: None,
                        items,
                    },
                    ty,
                ))
            }
            ExprKind::Binary { op, left, right } => self.build_binary(*op, left, right, ty),
            ExprKind::Comma(items) => {
                let values = items
                    .iter()
                    .map(|e| self.build_expr(e))
                    .collect::<SemanticResult<Vec<_>>>()?;
                let ty = values.last().map(|v| v.ty).unwrap_or(ValueTypeId::VOID);
                Ok(SemanticsValue::new(ValueKind::Comma(values), ty))
            }
            ExprKind::Conditional {
                cond,
                when_true,
                when_false,
            } => {
                let cond = self.build_condition(cond)?;
                let when_true = self.build_expr(when_true)?;
                let when_false = self.build_expr(when_false)?;
                let ty = if when_true.ty == when_false.ty {
                    when_true.ty
                } else {
                    ty
                };
                let when_true = self.cast(when_true, ty)?;
                let when_false = self.cast(when_false, ty)?;
                Ok(SemanticsValue::new(
                    ValueKind::Conditional {
                        cond: Box::new(cond),
                        when_true: Box::new(when_true),
                        when_false: Box::new(when_false),
                    },
                    ty,
                ))
            }
            ExprKind::Call {
                callee,
                args,
                type_args,
            } => self.build_call(callee, args, type_args, ty),
            ExprKind::Super => Ok(SemanticsValue::new(ValueKind::Super, ty)),
            ExprKind::This => {
                let this_ty = self
                    .current_function()
                    .and_then(|f| self.function(f).this_type)
                    .unwrap_or(ty);
                Ok(SemanticsValue::new(ValueKind::This, this_ty))
            }
            ExprKind::New {
                class,
                args,
                len,
                ..
            } => self.build_new(class, args, len.as_deref(), ty),
            ExprKind::ElementAccess { object, index } => self.build_element(object, index, ty),
            ExprKind::As(inner) => self.build_expr_as(inner, ty),
            ExprKind::Function(scope) => {
                let func = self.function_for(*scope)?;
                Ok(self.closure_value(func))
            }
            ExprKind::Paren(inner) => self.build_expr(inner),
            ExprKind::Unary {
                op,
                prefix,
                operand,
            } => self.build_unary(*op, *prefix, operand, ty),
            ExprKind::TypeOf(inner) => self.build_typeof(inner),
            ExprKind::Spread(inner) => {
                let value = self.build_expr(inner)?;
                let ty = value.ty;
                Ok(SemanticsValue::new(ValueKind::Spread(Box::new(value)), ty))
            }
            ExprKind::Template { head, spans } => self.build_template(head, spans),
            ExprKind::PropertyAccess { object, property } => self.build_property(object, property, ty),
            ExprKind::EnumerateKeys(inner) => {
                let value = self.with_ref(RefMode::Right, |ctx| ctx.build_expr(inner))?;
                Ok(SemanticsValue::new(ValueKind::EnumerateKeys(Box::new(value)), ty))
            }
            ExprKind::Unsupported(text) => Err(SemanticError::unsupported(text.clone())),
        }
    }

    // ── Names ───────────────────────────────────────────────────────────

    fn build_identifier(&mut self, name: &str) -> SemanticResult<SemanticsValue> {
        if self.ref_mode() == RefMode::Right {
            match name {
                "undefined" => return Ok(SemanticsValue::literal(Literal::Undefined)),
                "NaN" => return Ok(SemanticsValue::literal(Literal::Number(f64::NAN))),
                "Infinity" => return Ok(SemanticsValue::literal(Literal::Number(f64::INFINITY))),
                _ => {}
            }
        }
        let symbol = self.resolve_name(name, LookupKind::Identifier)?;
        self.symbol_value(symbol, name)
    }

    /// Value of a resolved symbol used in expression position
    pub(crate) fn symbol_value(&mut self, symbol: SymbolValue, name: &str) -> SemanticResult<SemanticsValue> {
        match symbol {
            SymbolValue::Var(var) => Ok(SemanticsValue::var(var, self.var(var).ty)),
            SymbolValue::Function(func) => Ok(SemanticsValue::new(
                ValueKind::Function(func),
                self.function(func).ty,
            )),
            SymbolValue::Class { desc, ty } => Ok(SemanticsValue::new(ValueKind::Class(desc), ty)),
            SymbolValue::Namespace(_) | SymbolValue::Enum(_) => Err(SemanticError::unsupported(
                format!("`{}` used as a value", name),
            )),
            SymbolValue::Type(_) => Err(SemanticError::SymbolResolution {
                lookup: LookupKind::Identifier,
                name: name.to_string(),
                scope: self.scope_name(),
            }),
        }
    }

    /// Namespace or enum named by `expr`, if it names one
    fn static_object(&mut self, expr: &Expr) -> SemanticResult<Option<SymbolValue>> {
        let binding = match &expr.kind {
            ExprKind::Identifier(name) => self
                .current_scope()
                .and_then(|scope| self.program.lookup(scope, name)),
            ExprKind::PropertyAccess { object, property } => match self.static_object(object)? {
                Some(SymbolValue::Namespace(scope)) => self.program.lookup_member(scope, property),
                _ => None,
            },
            ExprKind::Paren(inner) => return self.static_object(inner),
            _ => None,
        };
        Ok(match binding {
            Some(Binding::Namespace(scope)) => Some(SymbolValue::Namespace(scope)),
            Some(Binding::Enum(ty)) => Some(SymbolValue::Enum(self.value_type(ty)?)),
            _ => None,
        })
    }

    fn namespace_member(&mut self, scope: ScopeId, name: &str) -> SemanticResult<SymbolValue> {
        let binding = self.program.lookup_member(scope, name);
        let resolved = match binding {
            Some(binding) => self.resolve(binding.into())?,
            None => None,
        };
        resolved.ok_or_else(|| SemanticError::SymbolResolution {
            lookup: LookupKind::Member,
            name: name.to_string(),
            scope: self
                .program
                .scope(scope)
                .map(|s| s.name())
                .unwrap_or_default(),
        })
    }

    fn enum_member(&self, enum_ty: ValueTypeId, name: &str) -> SemanticResult<SemanticsValue> {
        let member = self
            .types
            .enumeration(enum_ty)
            .and_then(|e| e.member(name))
            .ok_or_else(|| SemanticError::SymbolResolution {
                lookup: LookupKind::Member,
                name: name.to_string(),
                scope: self.types.display(enum_ty).to_string(),
            })?;
        Ok(match member {
            EnumMember::Int(v) => SemanticsValue::literal(Literal::Int(*v)),
            EnumMember::String(s) => SemanticsValue::literal(Literal::String(s.clone())),
        })
    }

    pub(crate) fn function_for(&self, scope: ScopeId) -> SemanticResult<FuncId> {
        self.function_of_scope.get(&scope).copied().ok_or_else(|| {
            SemanticError::internal(format!("function scope {} was never registered", scope))
        })
    }

    // ── Operators ───────────────────────────────────────────────────────

    fn build_binary(&mut self, op: BinaryOp, left: &Expr, right: &Expr, ty: ValueTypeId) -> SemanticResult<SemanticsValue> {
        if op == BinaryOp::Assign {
            let value = self.build_expr(right)?;
            return self.build_assign(left, value);
        }
        if let Some(inner) = op.compound_operator() {
            return self.build_update(left, false, |ctx, current| {
                let operand = ctx.build_expr(right)?;
                ctx.binary_value(inner, current, operand, ty)
            });
        }
        let l = self.build_expr(left)?;
        let r = self.build_expr(right)?;
        self.binary_value(op, l, r, ty)
    }

    pub(crate) fn binary_value(
        &mut self,
        op: BinaryOp,
        left: SemanticsValue,
        right: SemanticsValue,
        ty: ValueTypeId,
    ) -> SemanticResult<SemanticsValue> {
        let (left, right, ty) = match op {
            op if op.is_comparison() => (
                self.comparable(left)?,
                self.comparable(right)?,
                ValueTypeId::BOOLEAN,
            ),
            BinaryOp::InstanceOf | BinaryOp::In => (left, right, ValueTypeId::BOOLEAN),
            BinaryOp::And | BinaryOp::Or => {
                let ty = if left.ty == right.ty { left.ty } else { ty };
                (self.cast(left, ty)?, self.cast(right, ty)?, ty)
            }
            _ => (self.cast(left, ty)?, self.cast(right, ty)?, ty),
        };
        Ok(SemanticsValue::new(
            ValueKind::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            },
            ty,
        ))
    }

    /// Comparisons of non-primitive operands go through `any`
    fn comparable(&mut self, value: SemanticsValue) -> SemanticResult<SemanticsValue> {
        if self.types.is_primitive(value.ty) {
            Ok(value)
        } else {
            self.cast(value, ValueTypeId::ANY)
        }
    }

    /// Lower `target = value`
    pub(crate) fn build_assign(&mut self, target: &Expr, value: SemanticsValue) -> SemanticResult<SemanticsValue> {
        let place = self.with_ref(RefMode::Left, |ctx| ctx.build_expr(target))?;
        let place_ty = place.ty;
        match place.kind {
            ValueKind::Var(var) => {
                let ty = self.var(var).ty;
                let value = self.cast(value, ty)?;
                Ok(SemanticsValue::assign(var, value))
            }
            ValueKind::MemberGet { object, access } => {
                let value = self.cast(value, place_ty)?;
                Ok(SemanticsValue::new(
                    ValueKind::MemberSet {
                        object,
                        access,
                        value: Box::new(value),
                    },
                    place_ty,
                ))
            }
            ValueKind::ElementGet {
                kind,
                object,
                index,
            } => {
                let value = self.cast(value, place_ty)?;
                Ok(SemanticsValue::new(
                    ValueKind::ElementSet {
                        kind,
                        object,
                        index,
                        value: Box::new(value),
                    },
                    place_ty,
                ))
            }
            _ => Err(SemanticError::unsupported(format!("assignment to `{}`", target))),
        }
    }

    /// `++`/`--` on a member or element: a read-modify-write through the
    /// getter and setter of the target
    fn build_step(&mut self, op: UnaryOp, prefix: bool, operand: &Expr) -> SemanticResult<SemanticsValue> {
        let step = if op == UnaryOp::Inc { BinaryOp::Add } else { BinaryOp::Sub };
        self.build_update(operand, !prefix, |ctx, current| {
            let ty = if current.ty == ValueTypeId::INT {
                ValueTypeId::INT
            } else {
                ValueTypeId::NUMBER
            };
            ctx.binary_value(step, current, SemanticsValue::literal(Literal::Int(1)), ty)
        })
    }

    /// Read-modify-write of `target`. Receiver and key are evaluated once
    /// and held in locals; `update` maps the current value to the stored
    /// one. With `postfix` the result is the value before the update.
    fn build_update(
        &mut self,
        target: &Expr,
        postfix: bool,
        update: impl FnOnce(&mut Self, SemanticsValue) -> SemanticResult<SemanticsValue>,
    ) -> SemanticResult<SemanticsValue> {
        let place = self.with_ref(RefMode::Left, |ctx| ctx.build_expr(target))?;
        let place_ty = place.ty;
        let mut steps = Vec::new();
        let place = match place.kind {
            ValueKind::Var(var) => Place::Var(var),
            ValueKind::MemberGet { object, access } => {
                let object = self.hold(*object, "recv", &mut steps)?;
                let get = match member_name(target) {
                    Some(name) => {
                        self.objects
                            .resolve_member(&self.types, object.ty, object.shape, name, AccessMode::Get)
                            .access
                    }
                    None => access.clone(),
                };
                Place::Member { object, get, set: access }
            }
            ValueKind::ElementGet { kind, object, index } => {
                let object = self.hold(*object, "recv", &mut steps)?;
                let index = self.hold(*index, "key", &mut steps)?;
                Place::Element { kind, object, index }
            }
            _ => return Err(SemanticError::unsupported(format!("assignment to `{}`", target))),
        };

        let mut current = match &place {
            Place::Var(var) => SemanticsValue::var(*var, self.var(*var).ty),
            Place::Member { object, get, .. } => SemanticsValue::new(
                ValueKind::MemberGet {
                    object: Box::new(object.clone()),
                    access: get.clone(),
                },
                place_ty,
            ),
            Place::Element { kind, object, index } => SemanticsValue::new(
                ValueKind::ElementGet {
                    kind: *kind,
                    object: Box::new(object.clone()),
                    index: Box::new(index.clone()),
                },
                place_ty,
            ),
        };
        let old = if postfix {
            let old = self.alloc_local("old", current.ty)?;
            let ty = current.ty;
            steps.push(SemanticsValue::assign(old, current));
            current = SemanticsValue::var(old, ty);
            Some(current.clone())
        } else {
            None
        };

        let value = update(self, current)?;
        let write = match place {
            Place::Var(var) => {
                let var_ty = self.var(var).ty;
                let value = self.cast(value, var_ty)?;
                SemanticsValue::assign(var, value)
            }
            Place::Member { object, set, .. } => {
                let value = self.cast(value, place_ty)?;
                SemanticsValue::new(
                    ValueKind::MemberSet {
                        object: Box::new(object),
                        access: set,
                        value: Box::new(value),
                    },
                    place_ty,
                )
            }
            Place::Element { kind, object, index } => {
                let value = self.cast(value, place_ty)?;
                SemanticsValue::new(
                    ValueKind::ElementSet {
                        kind,
                        object: Box::new(object),
                        index: Box::new(index),
                        value: Box::new(value),
                    },
                    place_ty,
                )
            }
        };
        if steps.is_empty() {
            return Ok(write);
        }
        let ty = old.as_ref().map_or(write.ty, |v| v.ty);
        steps.push(write);
        steps.extend(old);
        Ok(SemanticsValue::new(ValueKind::Comma(steps), ty))
    }

    /// Store `value` in a fresh local unless reading it again is free
    fn hold(&mut self, value: SemanticsValue, hint: &str, steps: &mut Vec<SemanticsValue>) -> SemanticResult<SemanticsValue> {
        if matches!(
            value.kind,
            ValueKind::Var(_) | ValueKind::This | ValueKind::Literal(_)
        ) {
            return Ok(value);
        }
        let (ty, shape) = (value.ty, value.shape);
        let temp = self.alloc_local(hint, ty)?;
        steps.push(SemanticsValue::assign(temp, value));
        Ok(SemanticsValue::var(temp, ty).with_shape(shape))
    }

    fn build_unary(&mut self, op: UnaryOp, prefix: bool, operand: &Expr, ty: ValueTypeId) -> SemanticResult<SemanticsValue> {
        let (operand, ty) = match op {
            UnaryOp::Not => (self.build_condition(operand)?, ValueTypeId::BOOLEAN),
            UnaryOp::Inc | UnaryOp::Dec => {
                if member_name(operand).is_some() || is_element(operand) {
                    return self.build_step(op, prefix, operand);
                }
                let place = self.build_expr(operand)?;
                if !matches!(place.kind, ValueKind::Var(_)) {
                    return Err(SemanticError::unsupported(format!("`{}` on `{}`", op, operand)));
                }
                let ty = place.ty;
                (place, ty)
            }
            UnaryOp::Neg | UnaryOp::Plus | UnaryOp::BitNot => (self.build_expr_as(operand, ty)?, ty),
        };
        Ok(SemanticsValue::new(
            ValueKind::Unary {
                op,
                prefix,
                operand: Box::new(operand),
            },
            ty,
        ))
    }

    /// `typeof x` folds to a literal when the static type decides it and
    /// evaluating `x` has no effect
    fn build_typeof(&mut self, inner: &Expr) -> SemanticResult<SemanticsValue> {
        let value = self.build_expr(inner)?;
        let folded = match self.types.kind(value.ty) {
            ValueTypeKind::Int | ValueTypeKind::Number => Some("number"),
            ValueTypeKind::Boolean => Some("boolean"),
            ValueTypeKind::String | ValueTypeKind::RawString => Some("string"),
            ValueTypeKind::Undefined | ValueTypeKind::Void => Some("undefined"),
            ValueTypeKind::Function => Some("function"),
            ValueTypeKind::Object | ValueTypeKind::Array | ValueTypeKind::Tuple | ValueTypeKind::Null => {
                Some("object")
            }
            _ => None,
        };
        let pure = matches!(
            value.kind,
            ValueKind::Var(_) | ValueKind::Literal(_) | ValueKind::This | ValueKind::Function(_)
        );
        match folded {
            Some(name) if pure => {
                Ok(SemanticsValue::literal(Literal::String(name.to_string())).retyped(ValueTypeId::STRING))
            }
            _ => Ok(SemanticsValue::new(
                ValueKind::TypeOf(Box::new(value)),
                ValueTypeId::STRING,
            )),
        }
    }

    /// Template literal as a left-to-right string concatenation
    fn build_template(&mut self, head: &str, spans: &[(Expr, String)]) -> SemanticResult<SemanticsValue> {
        let concat = |left: SemanticsValue, right: SemanticsValue| {
            SemanticsValue::new(
                ValueKind::Binary {
                    op: BinaryOp::Add,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                ValueTypeId::STRING,
            )
        };
        let mut acc = SemanticsValue::literal(Literal::String(head.to_string())).retyped(ValueTypeId::STRING);
        for (expr, text) in spans {
            let part = self.build_expr_as(expr, ValueTypeId::STRING)?;
            acc = concat(acc, part);
            if !text.is_empty() {
                acc = concat(acc, SemanticsValue::literal(Literal::String(text.clone())).retyped(ValueTypeId::STRING));
            }
        }
        Ok(acc)
    }

    // ── Objects ─────────────────────────────────────────────────────────

    fn build_object_literal(&mut self, fields: &[(String, Expr)], ty: ValueTypeId) -> SemanticResult<SemanticsValue> {
        let Some(desc) = self.objects.description_of(&self.types, ty) else {
            return Err(SemanticError::unsupported(format!(
                "object literal of type {}",
                self.types.display(ty)
            )));
        };
        let mut slots: Vec<Option<SemanticsValue>> = vec![None; self.objects.description(desc).slot_count()];
        for (name, expr) in fields {
            let (index, member_ty) = self
                .objects
                .description(desc)
                .member(name)
                .map(|m| (m.index as usize, m.value_type))
                .ok_or_else(|| SemanticError::SymbolResolution {
                    lookup: LookupKind::Member,
                    name: name.clone(),
                    scope: self.objects.description(desc).name.clone(),
                })?;
            let value = self.build_expr_as(expr, member_ty)?;
            if let Some(slot) = slots.get_mut(index) {
                *slot = Some(value);
            }
        }
        let fields = slots
            .into_iter()
            .map(|v| v.unwrap_or_else(|| SemanticsValue::literal(Literal::Undefined)))
            .collect();
        let shape = self.objects.description(desc).origin_shape;
        Ok(SemanticsValue::new(ValueKind::NewLiteral { desc, fields }, ty).with_shape(shape))
    }

    fn build_items(&mut self, items: &[Expr], element: ValueTypeId) -> SemanticResult<Vec<SemanticsValue>> {
        items
            .iter()
            .map(|item| {
                let value = self.build_expr(item)?;
                match value.kind {
                    ValueKind::Spread(_) => Ok(value),
                    _ => self.cast(value, element),
                }
            })
            .collect()
    }

    fn build_property(&mut self, object: &Expr, property: &str, ty: ValueTypeId) -> SemanticResult<SemanticsValue> {
        match self.static_object(object)? {
            Some(SymbolValue::Namespace(scope)) => {
                let symbol = self.namespace_member(scope, property)?;
                return self.symbol_value(symbol, property);
            }
            Some(SymbolValue::Enum(enum_ty)) => return self.enum_member(enum_ty, property),
            _ => {}
        }
        let mode = match self.ref_mode() {
            RefMode::Left => AccessMode::Set,
            RefMode::Right => AccessMode::Get,
        };
        let receiver = self.with_ref(RefMode::Right, |ctx| ctx.build_expr(object))?;
        Ok(self.member_get(receiver, property, mode, ty))
    }

    fn member_get(&self, receiver: SemanticsValue, name: &str, mode: AccessMode, ty: ValueTypeId) -> SemanticsValue {
        let resolved = self
            .objects
            .resolve_member(&self.types, receiver.ty, receiver.shape, name, mode);
        let value_ty = match (mode, resolved.kind) {
            (AccessMode::Set, Some(_)) => resolved.value_type,
            _ => ty,
        };
        SemanticsValue::new(
            ValueKind::MemberGet {
                object: Box::new(receiver),
                access: resolved.access,
            },
            value_ty,
        )
    }

    fn build_element(&mut self, object: &Expr, index: &Expr, ty: ValueTypeId) -> SemanticResult<SemanticsValue> {
        if let Some(SymbolValue::Enum(enum_ty)) = self.static_object(object)? {
            return match &index.kind {
                ExprKind::String(key) => self.enum_member(enum_ty, key),
                _ => Err(SemanticError::unsupported(format!("computed enum lookup `{}`", index))),
            };
        }
        let mode = match self.ref_mode() {
            RefMode::Left => AccessMode::Set,
            RefMode::Right => AccessMode::Get,
        };
        let (receiver, key) = self.with_ref(RefMode::Right, |ctx| {
            Ok((ctx.build_expr(object)?, ctx.build_expr(index)?))
        })?;

        // a constant key on a described object is a property access
        let described = self.objects.description_of(&self.types, receiver.ty).is_some();
        if let (true, Some(Literal::String(name))) = (described, key.as_literal()) {
            let name = name.clone();
            return Ok(self.member_get(receiver, &name, mode, ty));
        }

        let kind = if self.types.is_string(receiver.ty) {
            ElementKind::String
        } else if self.types.array_element(receiver.ty).is_some() {
            ElementKind::Array
        } else {
            ElementKind::Dynamic
        };
        let numeric = matches!(key.ty, ValueTypeId::INT | ValueTypeId::NUMBER);
        let key = match kind {
            ElementKind::String | ElementKind::Array if !numeric => self.cast(key, ValueTypeId::NUMBER)?,
            ElementKind::Dynamic if !numeric && !self.types.is_string(key.ty) => {
                self.cast(key, ValueTypeId::ANY)?
            }
            _ => key,
        };
        Ok(SemanticsValue::new(
            ValueKind::ElementGet {
                kind,
                object: Box::new(receiver),
                index: Box::new(key),
            },
            ty,
        ))
    }

    // ── Calls ───────────────────────────────────────────────────────────

    fn build_call(
        &mut self,
        callee: &Expr,
        args: &[Expr],
        type_args: &[TypeId],
        ty: ValueTypeId,
    ) -> SemanticResult<SemanticsValue> {
        match &callee.kind {
            ExprKind::Super => return self.build_super_call(args),
            ExprKind::Identifier(name) => {
                let symbol = self.resolve_name(name, LookupKind::Function)?;
                return self.call_symbol(symbol, name, args, type_args, ty);
            }
            ExprKind::PropertyAccess { object, property } => {
                match self.static_object(object)? {
                    Some(SymbolValue::Namespace(scope)) => {
                        let symbol = self.namespace_member(scope, property)?;
                        return self.call_symbol(symbol, property, args, type_args, ty);
                    }
                    Some(SymbolValue::Enum(_)) => {
                        return Err(SemanticError::unsupported(format!("call of `{}`", callee)))
                    }
                    _ => {}
                }
                if matches!(object.kind, ExprKind::Super) {
                    if let Some(call) = self.build_super_method_call(property, args, ty)? {
                        return Ok(call);
                    }
                }
                let receiver = self.with_ref(RefMode::Right, |ctx| ctx.build_expr(object))?;
                let resolved = self.objects.resolve_member(
                    &self.types,
                    receiver.ty,
                    receiver.shape,
                    property,
                    AccessMode::Call,
                );
                let fn_ty = self.types.function(resolved.value_type).map(|_| resolved.value_type);
                let args = self.build_args(args, fn_ty)?;
                return Ok(SemanticsValue::new(
                    ValueKind::MemberCall {
                        object: Box::new(receiver),
                        access: resolved.access,
                        args,
                    },
                    ty,
                ));
            }
            _ => {}
        }
        let callee = self.build_expr(callee)?;
        self.call_value(callee, args, ty)
    }

    fn call_symbol(
        &mut self,
        symbol: SymbolValue,
        name: &str,
        args: &[Expr],
        type_args: &[TypeId],
        ty: ValueTypeId,
    ) -> SemanticResult<SemanticsValue> {
        let SymbolValue::Function(mut func) = symbol else {
            let callee = self.symbol_value(symbol, name)?;
            return self.call_value(callee, args, ty);
        };
        if !type_args.is_empty() && self.can_specialize(func) {
            let type_args = type_args
                .iter()
                .map(|t| self.value_type(*t))
                .collect::<SemanticResult<Vec<_>>>()?;
            func = self.request_specialization(func, type_args)?;
        }
        let fn_ty = self.function(func).ty;
        let args = self.build_args(args, Some(fn_ty))?;
        Ok(SemanticsValue::new(ValueKind::Call { func, args }, ty))
    }

    /// Specialization is limited to module-level generic functions without
    /// nested functions; everything else calls the template
    fn can_specialize(&self, func: FuncId) -> bool {
        let f = self.function(func);
        f.is_generic()
            && f.generic.is_none()
            && f.parent.is_none()
            && f.scope
                .is_some_and(|s| self.program.nested_functions(s).is_empty())
    }

    fn call_value(&mut self, callee: SemanticsValue, args: &[Expr], ty: ValueTypeId) -> SemanticResult<SemanticsValue> {
        if let ValueKind::Function(func) = callee.kind {
            let args = self.build_args(args, Some(callee.ty))?;
            return Ok(SemanticsValue::new(ValueKind::Call { func, args }, ty));
        }
        if let ValueKind::Class(_) = callee.kind {
            return Err(SemanticError::unsupported("class constructor called without `new`"));
        }
        let kind = if self.types.function(callee.ty).is_some() {
            let args = self.build_args(args, Some(callee.ty))?;
            ValueKind::ClosureCall {
                callee: Box::new(callee),
                args,
            }
        } else {
            let args = self.build_args(args, None)?;
            ValueKind::DynamicCall {
                callee: Box::new(callee),
                args,
            }
        };
        Ok(SemanticsValue::new(kind, ty))
    }

    /// Arguments converted to the callee's parameter types; unknown
    /// parameters take `any`
    fn build_args(&mut self, args: &[Expr], fn_ty: Option<ValueTypeId>) -> SemanticResult<Vec<SemanticsValue>> {
        args.iter()
            .enumerate()
            .map(|(i, arg)| {
                let value = self.build_expr(arg)?;
                if let ValueKind::Spread(_) = value.kind {
                    return Ok(value);
                }
                let target = fn_ty
                    .and_then(|f| self.types.param_type(f, i))
                    .unwrap_or(ValueTypeId::ANY);
                self.cast(value, target)
            })
            .collect()
    }

    fn current_class(&self, what: &str) -> SemanticResult<DescId> {
        self.current_function()
            .and_then(|f| self.function(f).class)
            .ok_or_else(|| SemanticError::unsupported(format!("{} outside a class", what)))
    }

    fn build_super_call(&mut self, args: &[Expr]) -> SemanticResult<SemanticsValue> {
        let class = self.current_class("`super(...)`")?;
        let base = self.objects.description(class).base.ok_or_else(|| {
            SemanticError::unsupported(format!(
                "`super(...)` in `{}` without a base class",
                self.objects.description(class).name
            ))
        })?;
        let ctor = self.objects.description(base).constructor;
        let fn_ty = ctor.map(|c| self.function(c).ty);
        let args = self.build_args(args, fn_ty)?;
        Ok(SemanticsValue::new(
            ValueKind::ConstructorCall {
                desc: base,
                ctor,
                args,
            },
            ValueTypeId::VOID,
        ))
    }

    /// `super.m(...)` calls the base implementation directly
    fn build_super_method_call(
        &mut self,
        name: &str,
        args: &[Expr],
        ty: ValueTypeId,
    ) -> SemanticResult<Option<SemanticsValue>> {
        let class = self.current_class("`super` member call")?;
        let Some(base) = self.objects.description(class).base else {
            return Ok(None);
        };
        let base_desc = self.objects.description(base);
        let Some(func) = base_desc.member(name).and_then(|m| m.method) else {
            return Ok(None);
        };
        let base_ty = base_desc.value_type;
        let fn_ty = self.function(func).ty;
        let args = self.build_args(args, Some(fn_ty))?;
        Ok(Some(SemanticsValue::new(
            ValueKind::MemberCall {
                object: Box::new(SemanticsValue::new(ValueKind::This, base_ty)),
                access: MemberAccess::Direct { func },
                args,
            },
            ty,
        )))
    }

    fn build_new(
        &mut self,
        class: &Expr,
        args: &[Expr],
        len: Option<&Expr>,
        ty: ValueTypeId,
    ) -> SemanticResult<SemanticsValue> {
        if let Some(element) = self.types.array_element(ty) {
            let len = match len {
                Some(len) => Some(Box::new(self.build_expr_as(len, ValueTypeId::INT)?)),
                None => None,
            };
            let items = self.build_items(args, element)?;
            return Ok(SemanticsValue::new(ValueKind::NewArray { element, len, items }, ty));
        }

        let class_value = self.build_expr(class)?;
        let ValueKind::Class(class_desc) = class_value.kind else {
            return Err(SemanticError::unsupported(format!("`new` of `{}`", class)));
        };
        let desc = self
            .objects
            .description_of(&self.types, ty)
            .or(self.objects.description(class_desc).instance_desc)
            .ok_or_else(|| {
                SemanticError::internal(format!(
                    "class `{}` has no instance description",
                    self.objects.description(class_desc).name
                ))
            })?;
        let ctor = self
            .objects
            .description(desc)
            .constructor
            .or(self.objects.description(class_desc).constructor);
        let fn_ty = ctor.map(|c| self.function(c).ty);
        let args = self.build_args(args, fn_ty)?;
        let shape = self.objects.description(desc).origin_shape;
        Ok(SemanticsValue::new(ValueKind::New { desc, ctor, args }, ty).with_shape(shape))
    }
}

/// Target of a read-modify-write with its receiver and key already held
enum Place {
    Var(VarId),
    Member {
        object: SemanticsValue,
        get: MemberAccess,
        set: MemberAccess,
    },
    Element {
        kind: ElementKind,
        object: SemanticsValue,
        index: SemanticsValue,
    },
}

/// Property name a member target was resolved by
fn member_name(target: &Expr) -> Option<&str> {
    match &target.kind {
        ExprKind::PropertyAccess { property, .. } => Some(property.as_str()),
        ExprKind::ElementAccess { index, .. } => match &index.kind {
            ExprKind::String(key) => Some(key.as_str()),
            _ => None,
        },
        ExprKind::Paren(inner) => member_name(inner),
        _ => None,
    }
}

fn is_element(target: &Expr) -> bool {
    match &target.kind {
        ExprKind::ElementAccess { .. } => true,
        ExprKind::Paren(inner) => is_element(inner),
        _ => false,
    }
}
