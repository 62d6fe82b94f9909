//! The deferred computation behind a lambda value.

use core::sync::atomic::{AtomicU64, Ordering};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, Weak};
use std::thread::{self, ThreadId};

use indexmap::IndexMap;
use tracing::debug;

use super::guard::DepthGuard;
use crate::errors::{Error, Result};
use crate::scope::Scope;
use crate::source::SourceSegment;
use crate::sync::lock;
use crate::values::{Data, Value};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Grow the stack when less than this is left before forcing one level.
const STACK_RED_ZONE: usize = 128 * 1024;
const STACK_GROW_SIZE: usize = 2 * 1024 * 1024;

/// Computes a lambda's value in the scope it was created in.
pub type Compute = Arc<dyn Fn(&Scope) -> Result<Value> + Send + Sync>;

/// Receives a lambda's freshly computed value after each notification.
pub type Callback = Arc<dyn Fn(&Value) -> Result<()> + Send + Sync>;

enum ForceState {
    Unforced,
    Forcing(ThreadId),
    Forced(Value),
}

#[derive(Clone)]
enum Listener {
    /// Another lambda computed from this one.
    Dependent(Weak<Lambda>),
    Callback(Callback),
}

/// A deferred, reactive computation.
///
/// The first force runs `compute` and caches the result. A notification
/// clears the cache of this lambda and of everything that depends on it,
/// then calls each affected lambda's listener callbacks once, synchronously,
/// before returning.
///
/// A lambda that is already being forced on the current thread cannot be
/// forced again from inside its own computation; that re-entry fails with
/// `EXCESSIVE_RECURSION`. A concurrent force from another thread computes
/// independently and does not touch the cache.
pub struct Lambda {
    id: u64,
    operation: String,
    source: SourceSegment,
    scope: Scope,
    inputs: Vec<Value>,
    compute: Compute,
    fixable: bool,
    state: Mutex<ForceState>,
    /// Bumped on every invalidation; a force only caches if it is unchanged.
    generation: AtomicU64,
    listeners: Mutex<IndexMap<String, Listener>>,
    next_listener: AtomicU64,
    /// The lambda the last result was read from, when that was reactive.
    upstream: Mutex<Option<Weak<Lambda>>>,
    notifying: Mutex<Vec<ThreadId>>,
}

impl Lambda {
    pub(crate) fn new(
        scope: Scope,
        source: SourceSegment,
        operation: String,
        inputs: Vec<Value>,
        compute: Compute,
        fixable: bool,
    ) -> Arc<Self> {
        Arc::new(Self {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            operation,
            source,
            scope,
            inputs,
            compute,
            fixable,
            state: Mutex::new(ForceState::Unforced),
            generation: AtomicU64::new(0),
            listeners: Mutex::new(IndexMap::new()),
            next_listener: AtomicU64::new(1),
            upstream: Mutex::new(None),
            notifying: Mutex::new(Vec::new()),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Key under which this lambda registers with what it depends on.
    pub fn listener_id(&self) -> String {
        format!("lambda-{}", self.id)
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    pub fn source(&self) -> &SourceSegment {
        &self.source
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn inputs(&self) -> &[Value] {
        &self.inputs
    }

    /// Non-fixable lambdas never cache; every force re-evaluates.
    pub fn is_fixable(&self) -> bool {
        self.fixable
    }

    pub fn is_forced(&self) -> bool {
        matches!(*lock(&self.state), ForceState::Forced(_))
    }

    /// The cached result, if there is one.
    pub fn cached(&self) -> Option<Value> {
        match &*lock(&self.state) {
            ForceState::Forced(value) => Some(value.clone()),
            _ => None,
        }
    }

    /// Resolve to a concrete value, computing it at most once until the
    /// next notification.
    pub fn force(self: &Arc<Self>) -> Result<Value> {
        if !self.fixable {
            return self.evaluate();
        }
        let me = thread::current().id();
        let generation = {
            let mut state = lock(&self.state);
            match &*state {
                ForceState::Forced(value) => return Ok(value.clone()),
                ForceState::Forcing(owner) if *owner == me => {
                    return Err(Error::excessive_recursion(
                        DepthGuard::current(),
                        self.scope.runtime().config().max_depth(),
                    )
                    .with_source(self.source.clone()));
                }
                ForceState::Forcing(_) => None,
                ForceState::Unforced => {
                    *state = ForceState::Forcing(me);
                    Some(self.generation.load(Ordering::SeqCst))
                }
            }
        };

        let result = self.evaluate();

        if let Some(generation) = generation {
            let mut state = lock(&self.state);
            if matches!(&*state, ForceState::Forcing(owner) if *owner == me) {
                *state = match &result {
                    Ok(value) if self.generation.load(Ordering::SeqCst) == generation => {
                        ForceState::Forced(value.clone())
                    }
                    _ => ForceState::Unforced,
                };
            }
        }
        result
    }

    /// Run the computation in `scope` instead of the lambda's own scope.
    ///
    /// Nothing is cached and failures are returned as they are, without
    /// going through error handlers. Constraints and error handlers are
    /// applied this way.
    pub fn apply_in(&self, scope: &Scope) -> Result<Value> {
        let _guard = DepthGuard::enter(scope.runtime().config().max_depth())?;
        (self.compute)(scope)?.forced()
    }

    fn evaluate(self: &Arc<Self>) -> Result<Value> {
        let runtime = self.scope.runtime();
        let outcome = stacker::maybe_grow(STACK_RED_ZONE, STACK_GROW_SIZE, || {
            DepthGuard::enter(runtime.config().max_depth()).and_then(|_guard| {
                let value = (self.compute)(&self.scope)?;
                if let Some(inner) = value.as_lambda() {
                    // Results that are themselves reactive keep this lambda current.
                    self.track_upstream(inner);
                }
                value.forced()
            })
        });

        match outcome {
            Ok(value) => {
                runtime.learner().learn(&self.operation, &self.inputs, value.ty());
                Ok(value)
            }
            Err(mut err) => {
                err.add_source(self.source.clone());
                if runtime.config().debug_events() {
                    debug!(
                        lambda = self.listener_id().as_str(),
                        operation = self.operation.as_str(),
                        "force failed: {}",
                        err
                    );
                }
                self.scope.handle_error(err)
            }
        }
    }

    /// Drop the cached result, and the edge to the lambda it was read from.
    pub(crate) fn invalidate(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        {
            let mut state = lock(&self.state);
            if let ForceState::Forced(_) = &*state {
                *state = ForceState::Unforced;
            }
        }
        let upstream = lock(&self.upstream).take();
        if let Some(upstream) = upstream.and_then(|weak| weak.upgrade()) {
            upstream.remove_dependent(self);
        }
    }

    /// Returns false if `dependent` was already registered.
    pub(crate) fn add_dependent(&self, dependent: &Arc<Lambda>) -> bool {
        if dependent.id == self.id {
            return false;
        }
        let mut listeners = lock(&self.listeners);
        if listeners.contains_key(&dependent.listener_id()) {
            return false;
        }
        listeners.insert(
            dependent.listener_id(),
            Listener::Dependent(Arc::downgrade(dependent)),
        );
        true
    }

    fn remove_dependent(&self, dependent: &Lambda) {
        lock(&self.listeners).shift_remove(&dependent.listener_id());
    }

    /// Depend on `inner` until the next invalidation. Edges to declared
    /// inputs are permanent and left alone.
    fn track_upstream(self: &Arc<Self>, inner: &Arc<Lambda>) {
        let current = lock(&self.upstream).as_ref().and_then(Weak::upgrade);
        if current.as_ref().is_some_and(|current| current.id == inner.id) {
            return;
        }
        if !inner.add_dependent(self) {
            return;
        }
        let previous = lock(&self.upstream).replace(Arc::downgrade(inner));
        if let Some(previous) = previous.and_then(|weak| weak.upgrade()) {
            if previous.id != inner.id {
                previous.remove_dependent(self);
            }
        }
    }

    /// Live dependent lambdas. Dead ones are pruned.
    fn dependents(&self) -> Vec<Arc<Lambda>> {
        let mut listeners = lock(&self.listeners);
        listeners.retain(|_, listener| match listener {
            Listener::Dependent(weak) => weak.strong_count() > 0,
            Listener::Callback(_) => true,
        });
        listeners
            .values()
            .filter_map(|listener| match listener {
                Listener::Dependent(weak) => weak.upgrade(),
                Listener::Callback(_) => None,
            })
            .collect()
    }

    /// Register a callback, returning its id.
    pub fn listen(&self, callback: Callback) -> String {
        let id = format!(
            "listener-{}-{}",
            self.id,
            self.next_listener.fetch_add(1, Ordering::Relaxed)
        );
        self.listen_as(&id, callback);
        id
    }

    /// Register a callback under a caller-chosen id. An id already in use
    /// keeps its original callback.
    pub fn listen_as(&self, id: &str, callback: Callback) {
        lock(&self.listeners)
            .entry(id.to_string())
            .or_insert(Listener::Callback(callback));
    }

    pub fn unlisten(&self, id: &str) -> bool {
        lock(&self.listeners).shift_remove(id).is_some()
    }

    pub fn listener_count(&self) -> usize {
        lock(&self.listeners).len()
    }

    /// Invalidate this lambda and everything depending on it, then call
    /// listener callbacks. See [`Lambda::propagate`].
    pub fn notify(self: &Arc<Self>) -> Result<()> {
        Lambda::propagate(vec![self.clone()])
    }

    /// One notification pass over `roots` and every lambda reachable from
    /// them through dependent edges.
    ///
    /// All affected lambdas are invalidated first. Then each one's callbacks
    /// run once, in discovery order, with its freshly forced value; a lambda
    /// reachable along several paths is still visited once. A lambda already
    /// notifying on this thread is skipped, which stops a callback that
    /// reassigns its own input from looping.
    pub(crate) fn propagate(roots: Vec<Arc<Lambda>>) -> Result<()> {
        let Some(first) = roots.first() else {
            return Ok(());
        };
        let config = first.scope.runtime().config();
        let (max_depth, debug_events) = (config.max_depth(), config.debug_events());
        let _guard = DepthGuard::enter(max_depth)?;
        let me = thread::current().id();

        let mut affected: IndexMap<u64, Arc<Lambda>> = IndexMap::new();
        let mut pending: VecDeque<Arc<Lambda>> = roots.into();
        while let Some(lambda) = pending.pop_front() {
            if affected.contains_key(&lambda.id) || !lambda.enter_notify(me) {
                continue;
            }
            pending.extend(lambda.dependents());
            affected.insert(lambda.id, lambda);
        }
        if debug_events {
            debug!(affected = affected.len(), "notify");
        }

        for lambda in affected.values() {
            lambda.invalidate();
        }
        let result = affected
            .values()
            .try_for_each(|lambda| lambda.run_callbacks());
        for lambda in affected.values() {
            lambda.leave_notify(me);
        }
        result
    }

    fn enter_notify(&self, thread: ThreadId) -> bool {
        let mut notifying = lock(&self.notifying);
        if notifying.contains(&thread) {
            return false;
        }
        notifying.push(thread);
        true
    }

    fn leave_notify(&self, thread: ThreadId) {
        lock(&self.notifying).retain(|t| *t != thread);
    }

    fn run_callbacks(self: &Arc<Self>) -> Result<()> {
        let callbacks: Vec<Callback> = lock(&self.listeners)
            .values()
            .filter_map(|listener| match listener {
                Listener::Callback(callback) => Some(callback.clone()),
                Listener::Dependent(_) => None,
            })
            .collect();
        if callbacks.is_empty() {
            return Ok(());
        }
        if self.scope.runtime().config().debug_events() {
            debug!(
                lambda = self.listener_id().as_str(),
                operation = self.operation.as_str(),
                callbacks = callbacks.len(),
                "callbacks"
            );
        }

        let value = self.force()?;
        for callback in callbacks {
            if let Err(err) = callback(&value) {
                self.scope.handle_error(err.with_source(self.source.clone()))?;
            }
        }
        Ok(())
    }
}

impl Value {
    /// True for a lambda that has not been forced (or was invalidated).
    pub fn is_pending(&self) -> bool {
        match self.data() {
            Data::Lambda(lambda) => !lambda.is_forced(),
            _ => false,
        }
    }
}
