//! Dependency injector
//!
//! Handlers declare their parameters as a [`Signature`]. At startup the
//! [`Container`] checks every parameter against the named capabilities it
//! holds and hands the handler a [`Bindings`] view to build itself from.
//! A handler that cannot be bound stops the process before it serves a
//! single command.

use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::error::WiringError;
use crate::domain::Message;

/// Runtime identity of a dependency type
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct TypeKey {
    id: TypeId,
    name: &'static str,
}

impl TypeKey {
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl fmt::Debug for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParamKind {
    /// The command or event itself, supplied per call
    Message,
    Required,
    /// Has a default; bound only when present
    Optional,
}

/// One declared handler parameter
#[derive(Debug, Clone)]
pub struct Param {
    name: &'static str,
    ty: Option<TypeKey>,
    kind: ParamKind,
}

impl Param {
    /// The message parameter. Never bound from the container.
    pub fn message<M: Message>(name: &'static str) -> Self {
        Self {
            name,
            ty: Some(TypeKey::of::<M>()),
            kind: ParamKind::Message,
        }
    }

    pub fn required<T: ?Sized + 'static>(name: &'static str) -> Self {
        Self {
            name,
            ty: Some(TypeKey::of::<T>()),
            kind: ParamKind::Required,
        }
    }

    pub fn optional<T: ?Sized + 'static>(name: &'static str) -> Self {
        Self {
            name,
            ty: Some(TypeKey::of::<T>()),
            kind: ParamKind::Optional,
        }
    }

    /// A parameter with no declared type. Binding always rejects it.
    pub fn untyped(name: &'static str) -> Self {
        Self {
            name,
            ty: None,
            kind: ParamKind::Required,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

/// Declared parameter list of a handler
#[derive(Debug, Clone)]
pub struct Signature {
    pub handler: &'static str,
    pub params: Vec<Param>,
}

impl Signature {
    pub fn new(handler: &'static str) -> Self {
        Self {
            handler,
            params: Vec::new(),
        }
    }

    pub fn param(mut self, param: Param) -> Self {
        self.params.push(param);
        self
    }
}

#[derive(Clone)]
struct Dependency {
    ty: TypeKey,
    value: Arc<dyn Any + Send + Sync>,
}

/// Named capabilities available to handlers.
///
/// Built once by the composition root and read-only afterwards.
#[derive(Clone, Default)]
pub struct Container {
    deps: HashMap<&'static str, Dependency>,
}

impl Container {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) a named dependency
    pub fn provide<T>(mut self, name: &'static str, value: T) -> Self
    where
        T: Clone + Send + Sync + 'static,
    {
        self.deps.insert(
            name,
            Dependency {
                ty: TypeKey::of::<T>(),
                value: Arc::new(value),
            },
        );
        self
    }

    /// Validate a signature and collect what it needs
    pub fn bind(&self, signature: &Signature) -> Result<Bindings, WiringError> {
        let handler = signature.handler;
        let mut bound = HashMap::new();

        for param in &signature.params {
            let Some(expected) = param.ty else {
                return Err(WiringError::MissingTypeAnnotation {
                    handler,
                    param: param.name,
                });
            };

            match (param.kind, self.deps.get(param.name)) {
                (ParamKind::Message, _) => continue,
                (_, Some(dep)) if dep.ty != expected => {
                    return Err(WiringError::TypeMismatch {
                        handler,
                        dependency: param.name,
                        expected: expected.name,
                        found: dep.ty.name,
                    });
                }
                (_, Some(dep)) => {
                    bound.insert(param.name, dep.clone());
                }
                (ParamKind::Required, None) => {
                    return Err(WiringError::MissingDependency {
                        handler,
                        dependency: param.name,
                    });
                }
                (ParamKind::Optional, None) => continue,
            }
        }

        Ok(Bindings {
            handler,
            deps: bound,
        })
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.deps.iter().map(|(name, dep)| (name, dep.ty)))
            .finish()
    }
}

/// Dependencies validated for one handler
pub struct Bindings {
    handler: &'static str,
    deps: HashMap<&'static str, Dependency>,
}

impl Bindings {
    pub fn handler(&self) -> &'static str {
        self.handler
    }

    pub fn get<T: Clone + 'static>(&self, name: &'static str) -> Result<T, WiringError> {
        self.get_optional(name)?
            .ok_or(WiringError::MissingDependency {
                handler: self.handler,
                dependency: name,
            })
    }

    pub fn get_optional<T: Clone + 'static>(
        &self,
        name: &'static str,
    ) -> Result<Option<T>, WiringError> {
        let Some(dep) = self.deps.get(name) else {
            return Ok(None);
        };

        dep.value
            .downcast_ref::<T>()
            .cloned()
            .map(Some)
            .ok_or(WiringError::TypeMismatch {
                handler: self.handler,
                dependency: name,
                expected: type_name::<T>(),
                found: dep.ty.name,
            })
    }
}

/// A handler buildable from the container
pub trait Injectable: Sized {
    fn signature() -> Signature;

    fn from_bindings(bindings: &Bindings) -> Result<Self, WiringError>;
}

/// Bind and build a handler
pub fn inject<H: Injectable>(container: &Container) -> Result<H, WiringError> {
    let signature = H::signature();
    let bindings = container.bind(&signature)?;
    H::from_bindings(&bindings)
}
