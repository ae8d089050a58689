//! Object model and method dispatch for Mython programs.
//!
//! Values live behind [`ObjectHolder`]s, shared-ownership references whose
//! empty state is the one and only representation of `None`. Classes carry an
//! ordered method list and an optional parent; instances carry a class
//! reference and a mutable field table.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt::Write;
use std::rc::Rc;

use thiserror::Error;

use crate::ast::Statement;
use crate::interpreter;

pub(crate) const STR_METHOD: &str = "__str__";
pub(crate) const EQ_METHOD: &str = "__eq__";
pub(crate) const LESS_METHOD: &str = "__lt__";
pub(crate) const ADD_METHOD: &str = "__add__";
pub(crate) const INIT_METHOD: &str = "__init__";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    #[error("Variable '{name}' not found")]
    UndefinedVariable { name: String },
    #[error("Variable '{name}' is not a class instance")]
    NotAnInstance { name: String },
    #[error("Cannot call a method on a value of type {type_name}")]
    InvalidReceiver { type_name: String },
    #[error("No method '{method}' accepting {arity} arguments in class '{class}'")]
    UnknownMethod {
        class: String,
        method: String,
        arity: usize,
    },
    #[error("Operation '{operation}' is not supported for {lhs} and {rhs}")]
    UnsupportedOperands {
        operation: &'static str,
        lhs: String,
        rhs: String,
    },
    #[error("Unary '-' expects a number, got {type_name}")]
    InvalidNegation { type_name: String },
    #[error("Division by zero")]
    DivisionByZero,
    #[error("Cannot compare values of type {lhs} and {rhs}")]
    IncomparableValues { lhs: String, rhs: String },
    #[error("'return' outside of a method body")]
    ReturnOutsideMethod,
    #[error("Output stream write failed")]
    OutputWrite,
    #[error("Interpreter invariant violated: {message}")]
    InvariantViolation { message: &'static str },
}

/// Symbol table binding names to values for one execution frame.
pub type Closure = HashMap<String, ObjectHolder>;

/// Execution context supplying the output sink for `print` and `str`.
pub trait Context {
    fn output(&mut self) -> &mut dyn Write;
}

/// Context buffering all program output in a string; the CLI writes the
/// buffer to the output file once the program finishes.
#[derive(Debug, Default)]
pub struct StringContext {
    buffer: String,
}

impl StringContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn output_str(&self) -> &str {
        &self.buffer
    }

    pub fn into_output(self) -> String {
        self.buffer
    }
}

impl Context for StringContext {
    fn output(&mut self) -> &mut dyn Write {
        &mut self.buffer
    }
}

pub(crate) fn write_output(context: &mut dyn Context, text: &str) -> Result<(), RuntimeError> {
    context
        .output()
        .write_str(text)
        .map_err(|_| RuntimeError::OutputWrite)
}

#[derive(Debug)]
pub enum Object {
    Number(i32),
    String(String),
    Bool(bool),
    Class(Rc<Class>),
    Instance(ClassInstance),
}

/// Shared-ownership reference to a runtime value. An empty holder is the
/// canonical `None`; cloned holders alias the same underlying object, so a
/// field written through one alias is visible through all of them.
#[derive(Debug, Clone, Default)]
pub struct ObjectHolder(Option<Rc<Object>>);

impl ObjectHolder {
    pub fn none() -> Self {
        Self(None)
    }

    pub fn own(object: Object) -> Self {
        Self(Some(Rc::new(object)))
    }

    pub fn number(value: i32) -> Self {
        Self::own(Object::Number(value))
    }

    pub fn string(value: impl Into<String>) -> Self {
        Self::own(Object::String(value.into()))
    }

    pub fn boolean(value: bool) -> Self {
        Self::own(Object::Bool(value))
    }

    pub fn class(class: Rc<Class>) -> Self {
        Self::own(Object::Class(class))
    }

    pub fn instance(instance: ClassInstance) -> Self {
        Self::own(Object::Instance(instance))
    }

    pub fn get(&self) -> Option<&Object> {
        self.0.as_deref()
    }

    pub fn is_none(&self) -> bool {
        self.0.is_none()
    }

    pub fn as_number(&self) -> Option<i32> {
        match self.get() {
            Some(Object::Number(value)) => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self.get() {
            Some(Object::String(value)) => Some(value),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self.get() {
            Some(Object::Bool(value)) => Some(*value),
            _ => None,
        }
    }

    pub fn as_class(&self) -> Option<&Rc<Class>> {
        match self.get() {
            Some(Object::Class(class)) => Some(class),
            _ => None,
        }
    }

    pub fn as_instance(&self) -> Option<&ClassInstance> {
        match self.get() {
            Some(Object::Instance(instance)) => Some(instance),
            _ => None,
        }
    }

    /// Diagnostic name of the held value's type.
    pub fn type_name(&self) -> String {
        match self.get() {
            None => "NoneType".to_string(),
            Some(Object::Number(_)) => "int".to_string(),
            Some(Object::String(_)) => "str".to_string(),
            Some(Object::Bool(_)) => "bool".to_string(),
            Some(Object::Class(class)) => format!("class '{}'", class.name()),
            Some(Object::Instance(instance)) => instance.class().name().to_string(),
        }
    }
}

/// A class method: name, formal parameter names and the executable body.
#[derive(Debug)]
pub struct Method {
    pub name: String,
    pub formal_params: Vec<String>,
    pub body: Vec<Statement>,
}

/// A Mython class: an ordered method list plus an optional parent class for
/// single inheritance.
///
/// The method list sits behind a `RefCell` because the parser registers the
/// class object before its body is parsed (a method may construct instances
/// of the class it belongs to) and appends methods as it reads them. After
/// parsing the list is only ever read.
#[derive(Debug)]
pub struct Class {
    name: String,
    methods: RefCell<Vec<Rc<Method>>>,
    parent: Option<Rc<Class>>,
}

impl Class {
    pub fn new(name: impl Into<String>, methods: Vec<Method>, parent: Option<Rc<Class>>) -> Self {
        Self {
            name: name.into(),
            methods: RefCell::new(methods.into_iter().map(Rc::new).collect()),
            parent,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn add_method(&self, method: Method) {
        self.methods.borrow_mut().push(Rc::new(method));
    }

    /// First method with a matching name, searching this class before the
    /// parent chain.
    pub fn method(&self, name: &str) -> Option<Rc<Method>> {
        let methods = self.methods.borrow();
        if let Some(method) = methods.iter().find(|method| method.name == name) {
            return Some(Rc::clone(method));
        }
        self.parent.as_deref().and_then(|parent| parent.method(name))
    }

    /// Whether a method of this name exists and takes exactly `arity`
    /// arguments.
    pub fn has_method(&self, name: &str, arity: usize) -> bool {
        self.method(name)
            .is_some_and(|method| method.formal_params.len() == arity)
    }
}

/// An object with a class reference and a mutable field table. Fields sit
/// behind a `RefCell` so aliasing holders observe each other's writes.
#[derive(Debug)]
pub struct ClassInstance {
    class: Rc<Class>,
    fields: RefCell<Closure>,
}

impl ClassInstance {
    pub fn new(class: Rc<Class>) -> Self {
        Self {
            class,
            fields: RefCell::new(Closure::new()),
        }
    }

    pub fn class(&self) -> &Rc<Class> {
        &self.class
    }

    pub fn has_method(&self, method: &str, arity: usize) -> bool {
        self.class.has_method(method, arity)
    }

    pub fn field(&self, name: &str) -> Option<ObjectHolder> {
        self.fields.borrow().get(name).cloned()
    }

    pub fn set_field(&self, name: impl Into<String>, value: ObjectHolder) {
        self.fields.borrow_mut().insert(name.into(), value);
    }
}

/// Truthiness projection used by `if`, `and`, `or` and `not`: `Bool` by its
/// payload, numbers when nonzero, strings when non-empty. Everything else,
/// class objects and instances included, is falsy.
pub fn is_true(object: &ObjectHolder) -> bool {
    match object.get() {
        Some(Object::Bool(value)) => *value,
        Some(Object::Number(value)) => *value != 0,
        Some(Object::String(value)) => !value.is_empty(),
        _ => false,
    }
}

/// Renders a value the way `print` and `str` display it. An instance with a
/// zero-argument `__str__` delegates to it; otherwise a stable
/// `<Name object>` marker is produced.
pub fn render(object: &ObjectHolder, context: &mut dyn Context) -> Result<String, RuntimeError> {
    match object.get() {
        None => Ok("None".to_string()),
        Some(Object::Number(value)) => Ok(value.to_string()),
        Some(Object::String(value)) => Ok(value.clone()),
        Some(Object::Bool(value)) => Ok(if *value { "True" } else { "False" }.to_string()),
        Some(Object::Class(class)) => Ok(format!("Class {}", class.name())),
        Some(Object::Instance(instance)) => {
            if instance.has_method(STR_METHOD, 0) {
                let result = call_method(object, STR_METHOD, Vec::new(), context)?;
                render(&result, context)
            } else {
                Ok(format!("<{} object>", instance.class().name()))
            }
        }
    }
}

/// Dispatches `receiver.method(args)`: looks the name up through the class
/// chain, checks arity, then executes the body in a fresh closure binding
/// `self` and the formal parameters. Lookup stops at the first name match; an
/// arity mismatch there is not retried further up the chain.
pub fn call_method(
    receiver: &ObjectHolder,
    method: &str,
    actual_args: Vec<ObjectHolder>,
    context: &mut dyn Context,
) -> Result<ObjectHolder, RuntimeError> {
    let Some(instance) = receiver.as_instance() else {
        return Err(RuntimeError::InvalidReceiver {
            type_name: receiver.type_name(),
        });
    };
    let class = instance.class();
    let found = class
        .method(method)
        .filter(|found| found.formal_params.len() == actual_args.len());
    let Some(found) = found else {
        return Err(RuntimeError::UnknownMethod {
            class: class.name().to_string(),
            method: method.to_string(),
            arity: actual_args.len(),
        });
    };

    let mut closure = Closure::new();
    closure.insert("self".to_string(), receiver.clone());
    for (param, value) in found.formal_params.iter().zip(actual_args) {
        closure.insert(param.clone(), value);
    }
    interpreter::exec_method_body(&found.body, closure, context)
}

fn compare_primitives(
    lhs: &ObjectHolder,
    rhs: &ObjectHolder,
    pred: fn(Ordering) -> bool,
) -> Option<bool> {
    match (lhs.get(), rhs.get()) {
        (Some(Object::Bool(l)), Some(Object::Bool(r))) => Some(pred(l.cmp(r))),
        (Some(Object::Number(l)), Some(Object::Number(r))) => Some(pred(l.cmp(r))),
        (Some(Object::String(l)), Some(Object::String(r))) => Some(pred(l.cmp(r))),
        _ => None,
    }
}

/// Equality per the language rules: homogeneous primitives by value, then an
/// instance left operand dispatching to `__eq__`, then `None == None`.
/// Anything else cannot be compared.
pub fn equal(
    lhs: &ObjectHolder,
    rhs: &ObjectHolder,
    context: &mut dyn Context,
) -> Result<bool, RuntimeError> {
    if let Some(result) = compare_primitives(lhs, rhs, Ordering::is_eq) {
        return Ok(result);
    }
    if lhs.as_instance().is_some() {
        let result = call_method(lhs, EQ_METHOD, vec![rhs.clone()], context)?;
        return Ok(is_true(&result));
    }
    if lhs.is_none() && rhs.is_none() {
        return Ok(true);
    }
    Err(RuntimeError::IncomparableValues {
        lhs: lhs.type_name(),
        rhs: rhs.type_name(),
    })
}

/// Ordering per the language rules: homogeneous primitives by `<`, then an
/// instance left operand dispatching to `__lt__`. `None` is unordered.
pub fn less(
    lhs: &ObjectHolder,
    rhs: &ObjectHolder,
    context: &mut dyn Context,
) -> Result<bool, RuntimeError> {
    if let Some(result) = compare_primitives(lhs, rhs, Ordering::is_lt) {
        return Ok(result);
    }
    if lhs.as_instance().is_some() {
        let result = call_method(lhs, LESS_METHOD, vec![rhs.clone()], context)?;
        return Ok(is_true(&result));
    }
    Err(RuntimeError::IncomparableValues {
        lhs: lhs.type_name(),
        rhs: rhs.type_name(),
    })
}

pub fn not_equal(
    lhs: &ObjectHolder,
    rhs: &ObjectHolder,
    context: &mut dyn Context,
) -> Result<bool, RuntimeError> {
    Ok(!equal(lhs, rhs, context)?)
}

pub fn greater(
    lhs: &ObjectHolder,
    rhs: &ObjectHolder,
    context: &mut dyn Context,
) -> Result<bool, RuntimeError> {
    Ok(!(less(lhs, rhs, context)? || equal(lhs, rhs, context)?))
}

pub fn less_or_equal(
    lhs: &ObjectHolder,
    rhs: &ObjectHolder,
    context: &mut dyn Context,
) -> Result<bool, RuntimeError> {
    Ok(!greater(lhs, rhs, context)?)
}

pub fn greater_or_equal(
    lhs: &ObjectHolder,
    rhs: &ObjectHolder,
    context: &mut dyn Context,
) -> Result<bool, RuntimeError> {
    Ok(!less(lhs, rhs, context)?)
}
