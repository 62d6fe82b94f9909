//! Lexical scopes.

use core::fmt;
use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};
use std::thread;

use hashbrown::HashMap;
use indexmap::IndexMap;
use tracing::debug;

use super::variable::{Declaration, VarFlags, Variable};
use crate::api::Runtime;
use crate::errors::{Error, ErrorKind, Result};
use crate::lambda::Lambda;
use crate::source::SourceSegment;
use crate::sync::{lock, read, write};
use crate::values::Value;

static NEXT_SCOPE: AtomicU64 = AtomicU64::new(1);

/// `1`, `2`, ...: positional parameters, never plain variables.
fn is_positional(name: &str) -> bool {
    !name.is_empty() && name.bytes().all(|b| b.is_ascii_digit())
}

/// A lexical frame: variables, parameters, listeners and error handlers,
/// chained to a parent.
///
/// Scopes are cheap handles; clones refer to the same frame. A pure scope
/// (see [`sub_scope`](Self::sub_scope)) may only read variables that are
/// pure, or readonly and fixed, and may not declare volatile ones.
///
/// Lambdas close over their scope and a scope holds the values declared in
/// it, so a scope whose variables hold lambdas over itself stays alive until
/// [`destroy`](Self::destroy) or [`clear`](Self::clear) drops them.
#[derive(Clone)]
pub struct Scope {
    inner: Arc<ScopeInner>,
}

struct ScopeInner {
    id: String,
    runtime: Runtime,
    parent: Option<Scope>,
    source: SourceSegment,
    pure: bool,
    parameter_scope: AtomicBool,
    destroyed: AtomicBool,
    variables: RwLock<HashMap<String, Arc<Variable>>>,
    parameters: RwLock<HashMap<String, Arc<Variable>>>,
    listeners: Mutex<HashMap<String, IndexMap<String, Weak<Lambda>>>>,
    error_handlers: RwLock<Vec<Value>>,
}

// ============================================================================
// Construction and identity
// ============================================================================

impl Scope {
    /// A scope with no parent. Hosts normally go through
    /// [`Runtime::root_scope`], which also declares the registered globals.
    pub fn root(runtime: Runtime, source: SourceSegment) -> Scope {
        Self::create(runtime, None, source, false, "root")
    }

    fn create(
        runtime: Runtime,
        parent: Option<Scope>,
        source: SourceSegment,
        pure: bool,
        name: &str,
    ) -> Scope {
        let id = format!("{}-{}", name, NEXT_SCOPE.fetch_add(1, Ordering::Relaxed));
        if runtime.config().debug_scope() {
            debug!(
                scope = id.as_str(),
                parent = parent.as_ref().map_or("", |p| p.id()),
                pure,
                "created scope"
            );
        }
        Scope {
            inner: Arc::new(ScopeInner {
                id,
                runtime,
                parent,
                source,
                pure,
                parameter_scope: AtomicBool::new(false),
                destroyed: AtomicBool::new(false),
                variables: RwLock::new(HashMap::new()),
                parameters: RwLock::new(HashMap::new()),
                listeners: Mutex::new(HashMap::new()),
                error_handlers: RwLock::new(Vec::new()),
            }),
        }
    }

    /// A child scope. Children of a pure scope must be pure.
    pub fn sub_scope(&self, pure: bool, name: &str) -> Result<Scope> {
        self.check_alive()?;
        if self.inner.pure && !pure {
            return Err(Error::new(
                ErrorKind::PurityViolation,
                format!("Cannot create impure scope '{}' inside pure scope {}", name, self.id()),
            ));
        }
        Ok(Self::create(
            self.inner.runtime.clone(),
            Some(self.clone()),
            self.inner.source.clone(),
            pure,
            name,
        ))
    }

    /// Run `f` in a fresh child scope.
    pub fn in_sub_scope<T>(
        &self,
        pure: bool,
        name: &str,
        f: impl FnOnce(&Scope) -> Result<T>,
    ) -> Result<T> {
        let child = self.sub_scope(pure, name)?;
        f(&child)
    }

    /// A sibling scope starting with the same variables, parameters and
    /// handlers. Variable records are shared; later declarations are not.
    pub fn copy(&self) -> Result<Scope> {
        self.check_alive()?;
        let copy = Self::create(
            self.inner.runtime.clone(),
            self.inner.parent.clone(),
            self.inner.source.clone(),
            self.inner.pure,
            "copy",
        );
        *write(&copy.inner.variables) = read(&self.inner.variables).clone();
        *write(&copy.inner.parameters) = read(&self.inner.parameters).clone();
        *write(&copy.inner.error_handlers) = read(&self.inner.error_handlers).clone();
        copy.inner
            .parameter_scope
            .store(self.is_parameter_scope(), Ordering::SeqCst);
        Ok(copy)
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn runtime(&self) -> &Runtime {
        &self.inner.runtime
    }

    pub fn parent(&self) -> Option<&Scope> {
        self.inner.parent.as_ref()
    }

    pub fn source(&self) -> &SourceSegment {
        &self.inner.source
    }

    pub fn file(&self) -> Option<&str> {
        self.inner.source.file()
    }

    pub fn is_pure(&self) -> bool {
        self.inner.pure
    }

    pub fn is_root(&self) -> bool {
        self.inner.parent.is_none()
    }

    pub fn is_parameter_scope(&self) -> bool {
        self.inner.parameter_scope.load(Ordering::SeqCst)
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.load(Ordering::SeqCst)
    }

    /// True if `ancestor` is somewhere above this scope.
    pub fn has_parent(&self, ancestor: &Scope) -> bool {
        self.ancestors()
            .skip(1)
            .any(|scope| Arc::ptr_eq(&scope.inner, &ancestor.inner))
    }

    /// This scope, then each parent up to the root.
    fn ancestors(&self) -> impl Iterator<Item = &Scope> {
        core::iter::successors(Some(self), |scope| scope.parent())
    }

    fn check_alive(&self) -> Result<()> {
        if self.is_destroyed() {
            return Err(Error::assertion(format!(
                "Scope {} has been destroyed",
                self.id()
            )));
        }
        Ok(())
    }

    fn trace(&self, operation: &str, name: &str) {
        if self.inner.runtime.config().debug_scope() {
            debug!(scope = self.id(), name, "{}", operation);
        }
    }
}

// ============================================================================
// Variables
// ============================================================================

impl Scope {
    /// The scope declaring `name` and its record, searching upwards.
    fn find_variable(&self, name: &str) -> Option<(&Scope, Arc<Variable>)> {
        self.ancestors().find_map(|scope| {
            read(&scope.inner.variables)
                .get(name)
                .cloned()
                .map(|variable| (scope, variable))
        })
    }

    pub fn variable(&self, name: &str) -> Option<Arc<Variable>> {
        self.find_variable(name).map(|(_, variable)| variable)
    }

    pub fn has(&self, name: &str) -> bool {
        self.find_variable(name).is_some() || self.find_parameter(name).is_some()
    }

    pub fn constraint(&self, name: &str) -> Option<Value> {
        self.variable(name)?.constraint().cloned()
    }

    pub fn constraint_source(&self, name: &str) -> Option<String> {
        Some(self.variable(name)?.constraint_source()?.to_string())
    }

    /// Create (or redeclare) `name` in this scope.
    ///
    /// A fixed declaration stores the deep-fixed value. A constraint is
    /// checked against the value before it is stored; redeclaring with the
    /// same constraint source is accepted, a different one is not.
    pub fn declare(&self, name: &str, value: Value, declaration: Declaration) -> Result<Value> {
        self.check_alive()?;
        if is_positional(name) {
            return Err(Error::assertion(format!(
                "Cannot declare positional parameter '{}' as a variable",
                name
            )));
        }
        let mut declaration = declaration;
        if self.inner.pure {
            if declaration.flags.contains(VarFlags::VOLATILE) {
                return Err(Error::new(
                    ErrorKind::PurityViolation,
                    format!("Cannot declare volatile variable '{}' in a pure scope", name),
                ));
            }
            declaration.flags |= VarFlags::PURE;
        }

        let existing = read(&self.inner.variables).get(name).cloned();
        if let Some(existing) = &existing {
            if existing.is_readonly() {
                return Err(Error::readonly(name));
            }
            self.check_owner(name, existing)?;
            let requested = declaration
                .constraint_parts()
                .map(|(_, source)| source.to_string());
            match (existing.constraint_source(), requested.as_deref()) {
                (Some(old), Some(new)) if old != new => {
                    return Err(Error::new(
                        ErrorKind::ConstraintViolation,
                        format!(
                            "Cannot change the constraint on variable '{}' from '{}' to '{}'",
                            name, old, new
                        ),
                    ));
                }
                (Some(old), None) => {
                    if let Some(predicate) = existing.constraint() {
                        declaration = declaration.constraint(predicate.clone(), old);
                    }
                }
                _ => {}
            }
        }

        let previous = existing.map_or_else(Value::void, |variable| variable.value());
        let mut value = self.prepare(name, value, declaration.flags)?;
        if let Some((predicate, source)) = declaration.constraint_parts() {
            self.check_constraint(name, predicate, source, &value, &previous)?;
            value = value.constrain(source)?;
        }

        write(&self.inner.variables).insert(
            name.to_string(),
            Arc::new(Variable::new(value.clone(), &declaration)),
        );
        self.trace("declare", name);
        self.notify(name)?;
        Ok(value)
    }

    /// Assign `name`, in whichever scope declares it. An undeclared name
    /// is declared here.
    pub fn set(&self, name: &str, value: Value) -> Result<Value> {
        self.check_alive()?;
        if is_positional(name) {
            return Err(Error::assertion(format!(
                "Cannot set positional parameter '{}'",
                name
            )));
        }
        let Some((owner, variable)) = self.find_variable(name) else {
            return self.declare(name, value, Declaration::new());
        };

        if let Some(pure) = self
            .ancestors()
            .take_while(|scope| !Arc::ptr_eq(&scope.inner, &owner.inner))
            .find(|scope| scope.is_pure())
        {
            return Err(Error::new(
                ErrorKind::PurityViolation,
                format!(
                    "Cannot set variable '{}' declared outside pure scope {}",
                    name,
                    pure.id()
                ),
            ));
        }
        if variable.is_readonly() {
            return Err(Error::readonly(name));
        }
        self.check_owner(name, &variable)?;

        let mut value = self.prepare(name, value, variable.flags())?;
        if let (Some(predicate), Some(source)) = (variable.constraint(), variable.constraint_source()) {
            self.check_constraint(name, predicate, source, &value, &variable.value())?;
            value = value.constrain(source)?;
        }

        variable.replace(value.clone());
        self.trace("set", name);
        owner.notify(name)?;
        Ok(value)
    }

    /// Read `name`, searching upwards. Missing names read as void unless
    /// `must_find`. Positional names read parameters.
    pub fn get(&self, name: &str, must_find: bool) -> Result<Value> {
        self.check_alive()?;
        if is_positional(name) {
            return self.get_parameter(name);
        }
        if let Some((_, variable)) = self.find_variable(name) {
            if self.inner.pure && !variable.is_pure_readable() {
                return Err(Error::new(
                    ErrorKind::PurityViolation,
                    format!(
                        "Pure scope {} cannot read variable '{}', which is neither pure nor readonly and fixed",
                        self.id(),
                        name
                    ),
                ));
            }
            self.trace("get", name);
            return Ok(variable.value());
        }
        if let Some(parameter) = self.find_parameter(name) {
            return Ok(parameter.value());
        }
        if must_find {
            return Err(Error::variable_not_found(name, self.id()));
        }
        Ok(Value::void())
    }

    fn check_owner(&self, name: &str, variable: &Variable) -> Result<()> {
        if !variable.is_volatile() && variable.thread() != thread::current().id() {
            return Err(Error::new(
                ErrorKind::ConcurrencyViolation,
                format!(
                    "Variable '{}' belongs to another thread; declare it volatile to share it",
                    name
                ),
            ));
        }
        Ok(())
    }

    fn prepare(&self, name: &str, value: Value, flags: VarFlags) -> Result<Value> {
        let value = if flags.contains(VarFlags::FIXED) {
            value.fix_deep(false)?
        } else {
            value
        };
        if flags.contains(VarFlags::NUMERIC) && !value.is_lambda() && !value.is_number() {
            return Err(Error::new(
                ErrorKind::InvalidCast,
                format!("Variable '{}' is numeric and cannot hold {}", name, value.ty()),
            ));
        }
        Ok(value)
    }

    fn check_constraint(
        &self,
        name: &str,
        predicate: &Value,
        source: &str,
        value: &Value,
        previous: &Value,
    ) -> Result<()> {
        let violation = |detail: String| {
            Error::new(
                ErrorKind::ConstraintViolation,
                format!(
                    "Constraint '{}' on variable '{}' failed: {}",
                    source, name, detail
                ),
            )
        };
        let verdict = match predicate.as_lambda() {
            Some(lambda) => {
                let check = self.sub_scope(self.inner.pure, "constraint")?;
                check.parameter("it", value.clone())?;
                check.parameter("previous", previous.clone())?;
                let verdict = lambda.apply_in(&check);
                check.destroy();
                verdict.map_err(|err| violation(err.to_string()))?
            }
            None => predicate.clone(),
        };
        if verdict.is_true() {
            Ok(())
        } else {
            Err(violation(format!("{} is not allowed", value.to_human_string())))
        }
    }
}

// ============================================================================
// Parameters
// ============================================================================

impl Scope {
    /// Bind a parameter, making this a parameter scope. Positional
    /// parameters cannot be rebound.
    pub fn parameter(&self, key: &str, value: Value) -> Result<Value> {
        self.check_alive()?;
        self.inner.parameter_scope.store(true, Ordering::SeqCst);
        let mut parameters = write(&self.inner.parameters);
        if is_positional(key) && parameters.contains_key(key) {
            return Err(Error::assertion(format!(
                "Cannot change positional parameter '{}' in {}",
                key,
                self.id()
            )));
        }
        parameters.insert(
            key.to_string(),
            Arc::new(Variable::new(
                value.clone(),
                &Declaration::new().readonly().parameter(),
            )),
        );
        self.trace("parameter", key);
        Ok(value)
    }

    fn find_parameter(&self, key: &str) -> Option<Arc<Variable>> {
        let positional = is_positional(key);
        for scope in self.ancestors() {
            if !scope.is_parameter_scope() {
                continue;
            }
            if let Some(parameter) = read(&scope.inner.parameters).get(key) {
                return Some(parameter.clone());
            }
            if positional {
                return None;
            }
        }
        None
    }

    /// Read a parameter from the nearest parameter scope that binds it.
    /// Positional keys only look at the nearest parameter scope.
    pub fn get_parameter(&self, key: &str) -> Result<Value> {
        self.check_alive()?;
        Ok(self
            .find_parameter(key)
            .map_or_else(Value::void, |parameter| parameter.value()))
    }

    /// Positional parameters of the nearest parameter scope, in order.
    pub fn parameters(&self) -> Vec<Value> {
        let Some(scope) = self.ancestors().find(|scope| scope.is_parameter_scope()) else {
            return Vec::new();
        };
        let parameters = read(&scope.inner.parameters);
        let mut positional: Vec<(u64, Value)> = parameters
            .iter()
            .filter_map(|(key, parameter)| Some((key.parse().ok()?, parameter.value())))
            .collect();
        positional.sort_by_key(|(index, _)| *index);
        positional.into_iter().map(|(_, value)| value).collect()
    }
}

// ============================================================================
// Listeners
// ============================================================================

impl Scope {
    /// Notify `listener` whenever `name` is assigned. Only lambda values
    /// can be notified; anything else is ignored.
    pub fn listen(&self, name: &str, listener: &Value) -> Result<()> {
        self.check_alive()?;
        let Some(lambda) = listener.as_lambda() else {
            return Ok(());
        };
        let target = self.find_variable(name).map_or(self, |(owner, _)| owner);
        lock(&target.inner.listeners)
            .entry(name.to_string())
            .or_default()
            .entry(lambda.listener_id())
            .or_insert_with(|| Arc::downgrade(lambda));
        if self.inner.runtime.config().debug_events() {
            debug!(
                scope = target.id(),
                name,
                listener = lambda.listener_id().as_str(),
                "listen"
            );
        }
        Ok(())
    }

    /// Notify every listener on `name` registered with this scope.
    pub fn notify(&self, name: &str) -> Result<()> {
        let listeners: Vec<Arc<Lambda>> = {
            let mut registry = lock(&self.inner.listeners);
            match registry.get_mut(name) {
                Some(entries) => {
                    entries.retain(|_, listener| listener.strong_count() > 0);
                    entries.values().filter_map(Weak::upgrade).collect()
                }
                None => Vec::new(),
            }
        };
        if self.inner.runtime.config().debug_events() {
            debug!(scope = self.id(), name, listeners = listeners.len(), "notify");
        }
        Lambda::propagate(listeners)
    }

    pub fn listener_count(&self, name: &str) -> usize {
        lock(&self.inner.listeners)
            .get(name)
            .map_or(0, |entries| {
                entries.values().filter(|l| l.strong_count() > 0).count()
            })
    }
}

// ============================================================================
// Error handling and teardown
// ============================================================================

impl Scope {
    /// Handlers receive `type` and `msg` parameters when an error reaches
    /// this scope.
    pub fn add_error_handler(&self, handler: Value) -> Result<()> {
        self.check_alive()?;
        write(&self.inner.error_handlers).push(handler);
        Ok(())
    }

    /// Offer `error` to this scope's handlers, then to each parent.
    ///
    /// Handled errors become void. An error that reaches the root is
    /// reported to the runtime's sink, then returned as `Err` under
    /// `fail_fast` or as an error value otherwise. Assertions skip the
    /// handlers entirely.
    pub fn handle_error(&self, error: Error) -> Result<Value> {
        if !error.kind().is_recoverable() {
            return Err(error);
        }
        let handlers = read(&self.inner.error_handlers).clone();
        if handlers.is_empty() || self.is_destroyed() {
            return self.bubble(error);
        }

        let handler_scope = self.sub_scope(self.inner.pure, "error-handler")?;
        handler_scope.parameter("type", Value::string(error.kind().name()))?;
        handler_scope.parameter("msg", Value::string(error.message()))?;
        for handler in &handlers {
            if let Some(lambda) = handler.as_lambda() {
                if let Err(failure) = lambda.apply_in(&handler_scope) {
                    handler_scope.destroy();
                    return self.bubble(failure);
                }
            }
        }
        handler_scope.destroy();
        debug!(scope = self.id(), kind = error.kind().name(), "error handled");
        Ok(Value::void())
    }

    fn bubble(&self, error: Error) -> Result<Value> {
        match &self.inner.parent {
            Some(parent) => parent.handle_error(error),
            None => {
                self.inner.runtime.report(&error);
                if self.inner.runtime.config().fail_fast() {
                    Err(error)
                } else {
                    Ok(Value::failure(error))
                }
            }
        }
    }

    /// Drop every variable, listener and handler. Pure scopes cannot be
    /// cleared.
    pub fn clear(&self) -> Result<()> {
        if self.inner.pure {
            return Err(Error::new(
                ErrorKind::PurityViolation,
                format!("Cannot clear pure scope {}", self.id()),
            ));
        }
        self.check_alive()?;
        self.release();
        Ok(())
    }

    /// Release everything this scope holds. Any later use fails.
    pub fn destroy(&self) {
        if !self.inner.destroyed.swap(true, Ordering::SeqCst) {
            self.release();
            self.trace("destroy", "");
        }
    }

    fn release(&self) {
        write(&self.inner.variables).clear();
        write(&self.inner.parameters).clear();
        lock(&self.inner.listeners).clear();
        write(&self.inner.error_handlers).clear();
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("id", &self.inner.id)
            .field("pure", &self.inner.pure)
            .field("parent", &self.inner.parent.as_ref().map(Scope::id))
            .finish_non_exhaustive()
    }
}
