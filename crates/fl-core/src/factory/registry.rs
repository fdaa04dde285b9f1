//! An in-process [`TypeIntrospector`] backed by declared type definitions.
//!
//! Hosts that cannot reflect over their own types register them here. The
//! registry ships seeded with the common `java.lang`/`java.io` throwables so
//! declared exceptions like `java/io/IOException` resolve out of the box.

use super::introspect::{
    ConstructorSig, CtorArg, InstantiationError, ParamKind, ResolveError, Throwable,
    TypeHandle, TypeIntrospector, THROWABLE,
};
use std::collections::HashMap;
use std::sync::RwLock;

const OBJECT: &str = "java.lang.Object";

/// One registered type.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeDef {
    pub name: String,
    pub superclass: Option<String>,
    pub is_abstract: bool,
    pub constructors: Vec<ConstructorSig>,
    /// If set, every constructor call throws this.
    pub failing_init: Option<Throwable>,
}

impl TypeDef {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            superclass: Some(OBJECT.to_string()),
            is_abstract: false,
            constructors: Vec::new(),
            failing_init: None,
        }
    }

    pub fn extends(mut self, superclass: &str) -> Self {
        self.superclass = Some(superclass.to_string());
        self
    }

    pub fn constructor(mut self, params: Vec<ParamKind>) -> Self {
        self.constructors.push(ConstructorSig::new(params));
        self
    }

    pub fn abstract_type(mut self) -> Self {
        self.is_abstract = true;
        self
    }

    pub fn failing_init(mut self, thrown: Throwable) -> Self {
        self.failing_init = Some(thrown);
        self
    }

    /// The four constructors every standard throwable has.
    fn standard_throwable(name: &str, superclass: &str) -> Self {
        Self::new(name)
            .extends(superclass)
            .constructor(vec![])
            .constructor(vec![ParamKind::String])
            .constructor(vec![ParamKind::String, reference(THROWABLE)])
            .constructor(vec![reference(THROWABLE)])
    }

    /// `()` and `(String)` only.
    fn message_throwable(name: &str, superclass: &str) -> Self {
        Self::new(name)
            .extends(superclass)
            .constructor(vec![])
            .constructor(vec![ParamKind::String])
    }
}

fn reference(name: &str) -> ParamKind {
    ParamKind::Reference(name.to_string())
}

#[derive(Debug, Default)]
pub struct TypeRegistry {
    types: RwLock<HashMap<String, TypeDef>>,
}

impl TypeRegistry {
    /// A registry containing only `java.lang.Object`.
    pub fn new() -> Self {
        let registry = Self::default();
        registry.register(TypeDef {
            superclass: None,
            ..TypeDef::new(OBJECT).constructor(vec![])
        });
        registry
    }

    /// A registry seeded with the standard throwable hierarchy.
    pub fn with_standard_throwables() -> Self {
        let registry = Self::new();
        let lang = [
            TypeDef::standard_throwable(THROWABLE, OBJECT),
            TypeDef::standard_throwable("java.lang.Exception", THROWABLE),
            TypeDef::standard_throwable("java.lang.Error", THROWABLE),
            TypeDef::standard_throwable("java.lang.RuntimeException", "java.lang.Exception"),
            TypeDef::standard_throwable("java.lang.IllegalStateException", "java.lang.RuntimeException"),
            TypeDef::standard_throwable("java.lang.IllegalArgumentException", "java.lang.RuntimeException"),
            TypeDef::standard_throwable("java.lang.UnsupportedOperationException", "java.lang.RuntimeException"),
            TypeDef::standard_throwable("java.lang.ReflectiveOperationException", "java.lang.Exception"),
            TypeDef::standard_throwable("java.io.IOException", "java.lang.Exception"),
            TypeDef::message_throwable("java.lang.NullPointerException", "java.lang.RuntimeException"),
            TypeDef::message_throwable("java.lang.ArithmeticException", "java.lang.RuntimeException"),
            TypeDef::message_throwable("java.lang.ClassCastException", "java.lang.RuntimeException"),
            TypeDef::message_throwable("java.lang.InterruptedException", "java.lang.Exception"),
            TypeDef::message_throwable("java.lang.CloneNotSupportedException", "java.lang.Exception"),
            TypeDef::message_throwable("java.lang.OutOfMemoryError", "java.lang.Error"),
            TypeDef::message_throwable("java.lang.StackOverflowError", "java.lang.Error"),
            TypeDef::message_throwable("java.io.FileNotFoundException", "java.io.IOException"),
            TypeDef::message_throwable("java.io.EOFException", "java.io.IOException"),
            TypeDef::message_throwable("java.util.concurrent.TimeoutException", "java.lang.Exception"),
            TypeDef::message_throwable("java.util.NoSuchElementException", "java.lang.RuntimeException"),
            TypeDef::message_throwable("java.util.ConcurrentModificationException", "java.lang.RuntimeException"),
            TypeDef::message_throwable("java.lang.IndexOutOfBoundsException", "java.lang.RuntimeException")
                .constructor(vec![ParamKind::Int]),
            TypeDef::message_throwable(
                "java.lang.ArrayIndexOutOfBoundsException",
                "java.lang.IndexOutOfBoundsException",
            )
            .constructor(vec![ParamKind::Int]),
            TypeDef::new("java.io.UncheckedIOException")
                .extends("java.lang.RuntimeException")
                .constructor(vec![ParamKind::String, reference("java.io.IOException")])
                .constructor(vec![reference("java.io.IOException")]),
            TypeDef::new("java.lang.String")
                .constructor(vec![])
                .constructor(vec![ParamKind::String]),
        ];
        for def in lang {
            registry.register(def);
        }
        registry
    }

    /// Add or replace a type.
    pub fn register(&self, def: TypeDef) {
        let mut types = self.types.write().unwrap_or_else(|p| p.into_inner());
        types.insert(def.name.clone(), def);
    }

    pub fn contains(&self, binary_name: &str) -> bool {
        self.read().contains_key(binary_name)
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, TypeDef>> {
        self.types.read().unwrap_or_else(|p| p.into_inner())
    }

    fn check_args(ctor: &ConstructorSig, args: &[CtorArg]) -> bool {
        ctor.params.len() == args.len()
            && ctor.params.iter().zip(args).all(|(param, arg)| {
                matches!(
                    (param, arg),
                    (ParamKind::String, CtorArg::Str(_))
                        | (ParamKind::Int, CtorArg::Int(_))
                        | (ParamKind::Reference(_), CtorArg::Throwable(_))
                )
            })
    }
}

impl TypeIntrospector for TypeRegistry {
    fn resolve(&self, binary_name: &str) -> Result<TypeHandle, ResolveError> {
        let types = self.read();
        let def = types
            .get(binary_name)
            .ok_or_else(|| ResolveError::NotFound(binary_name.to_string()))?;
        if let Some(superclass) = &def.superclass {
            if !types.contains_key(superclass) {
                return Err(ResolveError::Linkage {
                    name: binary_name.to_string(),
                    reason: format!("superclass {superclass} not found"),
                });
            }
        }
        Ok(TypeHandle::new(binary_name))
    }

    fn is_assignable(&self, from: &str, to: &str) -> bool {
        let types = self.read();
        let mut current = Some(from);
        // Bounded walk so a cyclic registration cannot spin forever.
        for _ in 0..=types.len() {
            match current {
                Some(name) if name == to => return true,
                Some(name) => current = types.get(name).and_then(|d| d.superclass.as_deref()),
                None => return false,
            }
        }
        false
    }

    fn public_constructors(&self, ty: &TypeHandle) -> Vec<ConstructorSig> {
        self.read()
            .get(ty.binary_name())
            .map(|d| d.constructors.clone())
            .unwrap_or_default()
    }

    fn instantiate(
        &self,
        ty: &TypeHandle,
        ctor: &ConstructorSig,
        args: Vec<CtorArg>,
    ) -> Result<Throwable, InstantiationError> {
        let class = ty.binary_name().to_string();
        let def = self.read().get(&class).cloned().ok_or_else(|| {
            InstantiationError::NoSuchConstructor {
                class: class.clone(),
                ctor: ctor.to_string(),
            }
        })?;
        if def.is_abstract {
            return Err(InstantiationError::Abstract(class));
        }
        if !def.constructors.contains(ctor) {
            return Err(InstantiationError::NoSuchConstructor {
                class,
                ctor: ctor.to_string(),
            });
        }
        if !Self::check_args(ctor, &args) {
            return Err(InstantiationError::ArgumentMismatch {
                class,
                ctor: ctor.to_string(),
            });
        }
        if let Some(thrown) = def.failing_init {
            return Err(InstantiationError::ConstructorThrew { class, thrown });
        }

        let mut message = None;
        let mut cause = None;
        for arg in args {
            match arg {
                CtorArg::Str(s) if message.is_none() => message = Some(s),
                CtorArg::Throwable(t) => {
                    // A cause-only constructor takes the cause's description as its message.
                    if message.is_none() && ctor.params.len() == 1 {
                        message = Some(t.to_string());
                    }
                    cause = Some(Box::new(t));
                }
                _ => {}
            }
        }
        Ok(Throwable {
            class_name: class,
            message,
            cause,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_types_resolve_and_chain() {
        let r = TypeRegistry::with_standard_throwables();
        r.resolve("java.io.FileNotFoundException").unwrap();
        assert!(r.is_assignable("java.io.FileNotFoundException", THROWABLE));
        assert!(r.is_assignable("java.lang.RuntimeException", "java.lang.Exception"));
        assert!(!r.is_assignable("java.lang.Exception", "java.lang.RuntimeException"));
        assert!(!r.is_assignable("java.lang.String", THROWABLE));
    }

    #[test]
    fn unknown_and_unlinked_types() {
        let r = TypeRegistry::new();
        assert_eq!(
            r.resolve("com.acme.Missing").unwrap_err(),
            ResolveError::NotFound("com.acme.Missing".to_string())
        );
        r.register(TypeDef::new("com.acme.Orphan").extends("com.acme.Gone"));
        assert!(matches!(
            r.resolve("com.acme.Orphan"),
            Err(ResolveError::Linkage { .. })
        ));
    }

    #[test]
    fn cause_constructor_copies_cause_description() {
        let r = TypeRegistry::with_standard_throwables();
        let ty = r.resolve("java.io.IOException").unwrap();
        let ctor = ConstructorSig::new(vec![ParamKind::Reference(THROWABLE.to_string())]);
        let cause = Throwable::runtime_failure("injected exception");
        let t = r
            .instantiate(&ty, &ctor, vec![CtorArg::Throwable(cause.clone())])
            .unwrap();
        assert_eq!(
            t.message.as_deref(),
            Some("java.lang.RuntimeException: injected exception")
        );
        assert_eq!(t.cause.as_deref(), Some(&cause));
    }

    #[test]
    fn instantiate_checks_constructor_and_args() {
        let r = TypeRegistry::with_standard_throwables();
        let ty = r.resolve("java.lang.NullPointerException").unwrap();
        let int_ctor = ConstructorSig::new(vec![ParamKind::Int]);
        assert!(matches!(
            r.instantiate(&ty, &int_ctor, vec![CtorArg::Int(1)]),
            Err(InstantiationError::NoSuchConstructor { .. })
        ));
        let string_ctor = ConstructorSig::new(vec![ParamKind::String]);
        assert!(matches!(
            r.instantiate(&ty, &string_ctor, vec![CtorArg::Int(1)]),
            Err(InstantiationError::ArgumentMismatch { .. })
        ));
    }

    #[test]
    fn abstract_and_failing_types() {
        let r = TypeRegistry::with_standard_throwables();
        r.register(
            TypeDef::new("com.acme.Abstract")
                .extends("java.lang.Exception")
                .constructor(vec![])
                .abstract_type(),
        );
        r.register(
            TypeDef::new("com.acme.Grumpy")
                .extends("java.lang.Exception")
                .constructor(vec![])
                .failing_init(Throwable::new("java.lang.IllegalStateException", None)),
        );
        let no_arg = ConstructorSig::no_arg();
        let ty = r.resolve("com.acme.Abstract").unwrap();
        assert!(matches!(
            r.instantiate(&ty, &no_arg, vec![]),
            Err(InstantiationError::Abstract(_))
        ));
        let ty = r.resolve("com.acme.Grumpy").unwrap();
        assert!(matches!(
            r.instantiate(&ty, &no_arg, vec![]),
            Err(InstantiationError::ConstructorThrew { .. })
        ));
    }

    #[test]
    fn cyclic_hierarchy_terminates() {
        let r = TypeRegistry::new();
        r.register(TypeDef::new("a.A").extends("a.B"));
        r.register(TypeDef::new("a.B").extends("a.A"));
        assert!(!r.is_assignable("a.A", THROWABLE));
    }
}
