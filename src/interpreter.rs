//! Tree-walking executor for parsed programs.
//!
//! Statements evaluate against a closure and an output context. An in-flight
//! `return` travels through the [`Exec`] channel, separate from errors, and is
//! converted back into an ordinary value at the method-call boundary.

use crate::ast::{BinaryOp, Expression, Program, Statement, UnaryOp, VariablePath};
use crate::runtime::{
    self, ClassInstance, Closure, Context, ObjectHolder, RuntimeError,
};

/// Control-flow marker distinguishing normal completion from an unwinding
/// `return`.
enum Exec {
    Value(ObjectHolder),
    Return(ObjectHolder),
}

/// Executes a whole program against a fresh global closure. A `return`
/// surfacing at the top level is an error.
pub fn run_program(program: &Program, context: &mut dyn Context) -> Result<(), RuntimeError> {
    let mut closure = Closure::new();
    match exec_block(&program.statements, &mut closure, context)? {
        Exec::Return(_) => Err(RuntimeError::ReturnOutsideMethod),
        Exec::Value(_) => Ok(()),
    }
}

/// Runs a method body: a `return` inside surfaces here as the call result,
/// normal completion produces `None`.
pub(crate) fn exec_method_body(
    body: &[Statement],
    mut closure: Closure,
    context: &mut dyn Context,
) -> Result<ObjectHolder, RuntimeError> {
    match exec_block(body, &mut closure, context)? {
        Exec::Return(value) => Ok(value),
        Exec::Value(_) => Ok(ObjectHolder::none()),
    }
}

fn exec_block(
    body: &[Statement],
    closure: &mut Closure,
    context: &mut dyn Context,
) -> Result<Exec, RuntimeError> {
    for statement in body {
        if let Exec::Return(value) = exec_statement(statement, closure, context)? {
            return Ok(Exec::Return(value));
        }
    }
    Ok(Exec::Value(ObjectHolder::none()))
}

fn exec_statement(
    statement: &Statement,
    closure: &mut Closure,
    context: &mut dyn Context,
) -> Result<Exec, RuntimeError> {
    match statement {
        Statement::Assignment { var, rv } => {
            let value = eval_expression(rv, closure, context)?;
            closure.insert(var.clone(), value.clone());
            Ok(Exec::Value(value))
        }
        Statement::FieldAssignment { object, field, rv } => {
            let target = resolve_variable(object, closure)?;
            let Some(instance) = target.as_instance() else {
                return Err(RuntimeError::NotAnInstance {
                    name: object.tail.last().unwrap_or(&object.name).clone(),
                });
            };
            let value = eval_expression(rv, closure, context)?;
            instance.set_field(field.clone(), value.clone());
            Ok(Exec::Value(value))
        }
        Statement::Print(args) => {
            for (index, arg) in args.iter().enumerate() {
                if index > 0 {
                    runtime::write_output(context, " ")?;
                }
                let value = eval_expression(arg, closure, context)?;
                let rendered = runtime::render(&value, context)?;
                runtime::write_output(context, &rendered)?;
            }
            runtime::write_output(context, "\n")?;
            Ok(Exec::Value(ObjectHolder::none()))
        }
        Statement::Return(value) => {
            let value = match value {
                Some(expression) => eval_expression(expression, closure, context)?,
                None => ObjectHolder::none(),
            };
            Ok(Exec::Return(value))
        }
        Statement::ClassDefinition(class) => {
            closure.insert(class.name().to_string(), ObjectHolder::class(class.clone()));
            Ok(Exec::Value(ObjectHolder::none()))
        }
        Statement::If {
            condition,
            then_body,
            else_body,
        } => {
            let condition = eval_expression(condition, closure, context)?;
            if runtime::is_true(&condition) {
                exec_block(then_body, closure, context)
            } else if let Some(else_body) = else_body {
                exec_block(else_body, closure, context)
            } else {
                Ok(Exec::Value(ObjectHolder::none()))
            }
        }
        Statement::Expression(expression) => {
            Ok(Exec::Value(eval_expression(expression, closure, context)?))
        }
    }
}

fn eval_expression(
    expression: &Expression,
    closure: &mut Closure,
    context: &mut dyn Context,
) -> Result<ObjectHolder, RuntimeError> {
    match expression {
        Expression::Number(value) => Ok(ObjectHolder::number(*value)),
        Expression::String(value) => Ok(ObjectHolder::string(value.clone())),
        Expression::Bool(value) => Ok(ObjectHolder::boolean(*value)),
        Expression::None => Ok(ObjectHolder::none()),
        Expression::Variable(path) => resolve_variable(path, closure),
        Expression::Stringify(argument) => {
            let value = eval_expression(argument, closure, context)?;
            Ok(ObjectHolder::string(runtime::render(&value, context)?))
        }
        Expression::Unary { op, operand } => {
            let value = eval_expression(operand, closure, context)?;
            match op {
                UnaryOp::Not => Ok(ObjectHolder::boolean(!runtime::is_true(&value))),
                UnaryOp::Neg => match value.as_number() {
                    Some(number) => Ok(ObjectHolder::number(-number)),
                    None => Err(RuntimeError::InvalidNegation {
                        type_name: value.type_name(),
                    }),
                },
            }
        }
        Expression::Binary { op, lhs, rhs } => eval_binary(*op, lhs, rhs, closure, context),
        Expression::MethodCall {
            object,
            method,
            args,
        } => {
            let receiver = eval_expression(object, closure, context)?;
            if receiver.as_instance().is_none() {
                return Err(RuntimeError::InvalidReceiver {
                    type_name: receiver.type_name(),
                });
            }
            let actual_args = eval_arguments(args, closure, context)?;
            runtime::call_method(&receiver, method, actual_args, context)
        }
        Expression::NewInstance { class, args } => {
            let Some(class) = class.upgrade() else {
                return Err(RuntimeError::InvariantViolation {
                    message: "class object dropped before instantiation",
                });
            };
            let instance = ObjectHolder::instance(ClassInstance::new(class.clone()));
            // Arguments are only evaluated when a matching constructor
            // exists; otherwise the instance stays uninitialized.
            if class.has_method(runtime::INIT_METHOD, args.len()) {
                let actual_args = eval_arguments(args, closure, context)?;
                runtime::call_method(&instance, runtime::INIT_METHOD, actual_args, context)?;
            }
            Ok(instance)
        }
    }
}

fn eval_arguments(
    args: &[Expression],
    closure: &mut Closure,
    context: &mut dyn Context,
) -> Result<Vec<ObjectHolder>, RuntimeError> {
    let mut actual_args = Vec::with_capacity(args.len());
    for arg in args {
        actual_args.push(eval_expression(arg, closure, context)?);
    }
    Ok(actual_args)
}

fn eval_binary(
    op: BinaryOp,
    lhs: &Expression,
    rhs: &Expression,
    closure: &mut Closure,
    context: &mut dyn Context,
) -> Result<ObjectHolder, RuntimeError> {
    match op {
        // `or` and `and` decide whether the right operand runs at all.
        BinaryOp::Or => {
            let left = eval_expression(lhs, closure, context)?;
            if runtime::is_true(&left) {
                return Ok(ObjectHolder::boolean(true));
            }
            let right = eval_expression(rhs, closure, context)?;
            Ok(ObjectHolder::boolean(runtime::is_true(&right)))
        }
        BinaryOp::And => {
            let left = eval_expression(lhs, closure, context)?;
            if !runtime::is_true(&left) {
                return Ok(ObjectHolder::boolean(false));
            }
            let right = eval_expression(rhs, closure, context)?;
            Ok(ObjectHolder::boolean(runtime::is_true(&right)))
        }
        BinaryOp::Add => {
            let left = eval_expression(lhs, closure, context)?;
            let right = eval_expression(rhs, closure, context)?;
            eval_add(left, right, context)
        }
        BinaryOp::Sub | BinaryOp::Mult | BinaryOp::Div => {
            let left = eval_expression(lhs, closure, context)?;
            let right = eval_expression(rhs, closure, context)?;
            eval_arithmetic(op, left, right)
        }
        BinaryOp::Eq
        | BinaryOp::NotEq
        | BinaryOp::Less
        | BinaryOp::Greater
        | BinaryOp::LessOrEq
        | BinaryOp::GreaterOrEq => {
            let left = eval_expression(lhs, closure, context)?;
            let right = eval_expression(rhs, closure, context)?;
            let result = match op {
                BinaryOp::Eq => runtime::equal(&left, &right, context)?,
                BinaryOp::NotEq => runtime::not_equal(&left, &right, context)?,
                BinaryOp::Less => runtime::less(&left, &right, context)?,
                BinaryOp::Greater => runtime::greater(&left, &right, context)?,
                BinaryOp::LessOrEq => runtime::less_or_equal(&left, &right, context)?,
                _ => runtime::greater_or_equal(&left, &right, context)?,
            };
            Ok(ObjectHolder::boolean(result))
        }
    }
}

fn eval_add(
    left: ObjectHolder,
    right: ObjectHolder,
    context: &mut dyn Context,
) -> Result<ObjectHolder, RuntimeError> {
    if let (Some(l), Some(r)) = (left.as_number(), right.as_number()) {
        return Ok(ObjectHolder::number(l + r));
    }
    if let (Some(l), Some(r)) = (left.as_str(), right.as_str()) {
        return Ok(ObjectHolder::string(format!("{l}{r}")));
    }
    if left.as_instance().is_some() {
        return runtime::call_method(&left, runtime::ADD_METHOD, vec![right], context);
    }
    Err(RuntimeError::UnsupportedOperands {
        operation: "+",
        lhs: left.type_name(),
        rhs: right.type_name(),
    })
}

fn eval_arithmetic(
    op: BinaryOp,
    left: ObjectHolder,
    right: ObjectHolder,
) -> Result<ObjectHolder, RuntimeError> {
    // The zero check comes before operand type checking.
    if op == BinaryOp::Div && right.as_number() == Some(0) {
        return Err(RuntimeError::DivisionByZero);
    }
    let (symbol, apply): (&'static str, fn(i32, i32) -> i32) = match op {
        BinaryOp::Mult => ("*", |l, r| l * r),
        BinaryOp::Div => ("/", |l, r| l / r),
        _ => ("-", |l, r| l - r),
    };
    match (left.as_number(), right.as_number()) {
        (Some(l), Some(r)) => Ok(ObjectHolder::number(apply(l, r))),
        _ => Err(RuntimeError::UnsupportedOperands {
            operation: symbol,
            lhs: left.type_name(),
            rhs: right.type_name(),
        }),
    }
}

/// Walks a dotted path: the head through the closure, every further segment
/// through the fields of the instance reached so far.
fn resolve_variable(path: &VariablePath, closure: &Closure) -> Result<ObjectHolder, RuntimeError> {
    let mut current = closure
        .get(&path.name)
        .cloned()
        .ok_or_else(|| RuntimeError::UndefinedVariable {
            name: path.name.clone(),
        })?;
    let mut previous = &path.name;
    for segment in &path.tail {
        let Some(instance) = current.as_instance() else {
            return Err(RuntimeError::NotAnInstance {
                name: previous.clone(),
            });
        };
        let next = instance
            .field(segment)
            .ok_or_else(|| RuntimeError::UndefinedVariable {
                name: segment.clone(),
            })?;
        current = next;
        previous = segment;
    }
    Ok(current)
}
