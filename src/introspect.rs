//! Structural access to host objects whose layout is only known at runtime.
//!
//! Host types describe themselves once through `Reflect::describe`. The
//! resulting `TypeDescriptor` lists the declared fields of the type in order,
//! along with accessors for reading and writing them. Since field names of
//! host types are not trustworthy, fields are located by their declared type,
//! either exactly or by simple name, and then addressed by position.

use failure_derive::Fail;
use lazy_static::lazy_static;
use log::trace;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::iter::successors;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

/// A type-erased field value
pub type Value = Box<dyn Any + Send>;

/// A shared host object, as read from an object field
pub type Object = Arc<dyn Reflect>;

/// An error reading or writing a field
#[derive(Debug, Fail)]
pub enum Error {
    /// The requested position is past the number of matching fields
    #[fail(display = "position {} out of range for {} fields", position, len)]
    OutOfRange {
        /// The requested position
        position: usize,
        /// The number of fields available
        len: usize,
    },

    /// The field could not be accessed with the given object or value
    #[fail(display = "invalid argument: {}", _0)]
    InvalidArgument(String),
}

/// Result type for field access
pub type Result<T> = std::result::Result<T, Error>;

/// A host object which can describe its own structure
pub trait Reflect: Send + Sync + 'static {
    /// Build a descriptor for the concrete type of this object. This is called
    /// at most once per type when going through `descriptor_of`.
    fn describe(&self) -> TypeDescriptor;

    /// Get this object as `Any`
    fn as_any(&self) -> &dyn Any;

    /// Get this object as mutable `Any`
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// The identity of a declared field type
#[derive(Clone, Copy)]
pub struct TypeKey {
    id: TypeId,
    path: &'static str,
}

impl TypeKey {
    /// Get the key for the type `T`
    pub fn of<T: 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            path: std::any::type_name::<T>(),
        }
    }

    /// The unqualified type name, without generic arguments
    pub fn simple_name(&self) -> &'static str {
        simple_name(self.path)
    }

    /// The full type path
    pub fn path(&self) -> &'static str {
        self.path
    }
}

impl PartialEq for TypeKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeKey {}

impl fmt::Debug for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.path)
    }
}

/// Strip the module path and generic arguments from a type path
fn simple_name(path: &str) -> &str {
    let base = path.split('<').next().unwrap_or(path);
    base.rsplit("::").next().unwrap_or(base)
}

/// How to pick fields out of a type
#[derive(Debug, Clone, Copy)]
pub enum Selector<'a> {
    /// Fields whose declared type is exactly the given type
    Exact(TypeKey),

    /// Fields whose declared type has the given simple name, ignoring case
    SimpleName(&'a str),
}

impl<'a> Selector<'a> {
    /// Select fields of exactly type `T`
    pub fn exact<T: 'static>() -> Self {
        Selector::Exact(TypeKey::of::<T>())
    }

    fn matches(&self, field: &FieldDescriptor) -> bool {
        match self {
            Selector::Exact(key) => field.declared == *key,
            Selector::SimpleName(name) => field.declared.simple_name().eq_ignore_ascii_case(name),
        }
    }
}

type Getter = Box<dyn Fn(&dyn Any) -> Result<Option<Value>> + Send + Sync>;
type Setter = Box<dyn Fn(&mut dyn Any, Value) -> Result<()> + Send + Sync>;
type ObjectGetter = Box<dyn Fn(&dyn Any) -> Result<Option<Object>> + Send + Sync>;

fn downcast<'o, O: 'static>(any: &'o dyn Any, field: &str) -> Result<&'o O> {
    any.downcast_ref::<O>().ok_or_else(|| {
        Error::InvalidArgument(format!(
            "field {} does not belong to {}",
            field,
            std::any::type_name::<O>()
        ))
    })
}

fn downcast_mut<'o, O: 'static>(any: &'o mut dyn Any, field: &str) -> Result<&'o mut O> {
    any.downcast_mut::<O>().ok_or_else(|| {
        Error::InvalidArgument(format!(
            "field {} does not belong to {}",
            field,
            std::any::type_name::<O>()
        ))
    })
}

/// A single declared field of a host type
pub struct FieldDescriptor {
    name: String,
    declared: TypeKey,
    is_static: bool,
    public: bool,
    accessible: AtomicBool,
    getter: Option<Getter>,
    setter: Option<Setter>,
    object: Option<ObjectGetter>,
}

impl FieldDescriptor {
    /// The declared name of this field. Host field names may be obfuscated, so
    /// this is informational only.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The declared type of this field
    pub fn declared_type(&self) -> TypeKey {
        self.declared
    }

    /// Whether this field is static (not part of an instance)
    pub fn is_static(&self) -> bool {
        self.is_static
    }

    /// Whether this field may currently be read and written
    pub fn is_accessible(&self) -> bool {
        self.public || self.accessible.load(Ordering::Acquire)
    }

    /// Allow reads and writes of this field regardless of its visibility
    pub fn mark_accessible(&self) {
        self.accessible.store(true, Ordering::Release);
    }

    fn check_access(&self) -> Result<()> {
        if self.is_accessible() {
            Ok(())
        } else {
            Err(Error::InvalidArgument(format!(
                "field {} is not accessible",
                self.name
            )))
        }
    }

    /// Read the value of this field from the given object. `None` is returned
    /// when the field is currently unset.
    pub fn get(&self, obj: &dyn Reflect) -> Result<Option<Value>> {
        self.check_access()?;
        match &self.getter {
            Some(getter) => getter(obj.as_any()),
            None => Err(Error::InvalidArgument(format!(
                "field {} cannot be read from an instance",
                self.name
            ))),
        }
    }

    /// Read the value of this field, downcast to `T`
    pub fn get_as<T: 'static>(&self, obj: &dyn Reflect) -> Result<Option<T>> {
        match self.get(obj)? {
            Some(value) => value.downcast::<T>().map(|v| Some(*v)).map_err(|_| {
                Error::InvalidArgument(format!(
                    "field {} of type {:?} is not a {}",
                    self.name,
                    self.declared,
                    std::any::type_name::<T>()
                ))
            }),
            None => Ok(None),
        }
    }

    /// Read the value of an object field as a shared host object
    pub fn get_object(&self, obj: &dyn Reflect) -> Result<Option<Object>> {
        self.check_access()?;
        match &self.object {
            Some(getter) => getter(obj.as_any()),
            None => Err(Error::InvalidArgument(format!(
                "field {} of type {:?} does not hold a host object",
                self.name, self.declared
            ))),
        }
    }

    /// Write a new value to this field of the given object
    pub fn set(&self, obj: &mut dyn Reflect, value: Value) -> Result<()> {
        self.check_access()?;
        match &self.setter {
            Some(setter) => setter(obj.as_any_mut(), value),
            None => Err(Error::InvalidArgument(format!(
                "field {} is read-only",
                self.name
            ))),
        }
    }

    /// Re-root the accessors of this field so they operate on an `O` which
    /// embeds the `P` this field was declared on
    fn project<O: 'static, P: 'static>(
        self,
        up: fn(&O) -> &P,
        up_mut: fn(&mut O) -> &mut P,
    ) -> Self {
        let name = self.name.clone();
        let getter = self.getter.map(|inner| {
            let name = name.clone();
            Box::new(move |any: &dyn Any| {
                let parent: &dyn Any = up(downcast::<O>(any, &name)?);
                inner(parent)
            }) as Getter
        });
        let setter = self.setter.map(|inner| {
            let name = name.clone();
            Box::new(move |any: &mut dyn Any, value: Value| {
                let parent: &mut dyn Any = up_mut(downcast_mut::<O>(any, &name)?);
                inner(parent, value)
            }) as Setter
        });
        let object = self.object.map(|inner| {
            let name = name.clone();
            Box::new(move |any: &dyn Any| {
                let parent: &dyn Any = up(downcast::<O>(any, &name)?);
                inner(parent)
            }) as ObjectGetter
        });

        Self {
            getter,
            setter,
            object,
            ..self
        }
    }
}

impl fmt::Debug for FieldDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("FieldDescriptor")
            .field("name", &self.name)
            .field("declared", &self.declared)
            .field("is_static", &self.is_static)
            .field("accessible", &self.is_accessible())
            .finish()
    }
}

/// The runtime structure of a host type
#[derive(Debug)]
pub struct TypeDescriptor {
    name: String,
    namespace: String,
    fields: Vec<FieldDescriptor>,
    supertype: Option<Box<TypeDescriptor>>,
}

impl TypeDescriptor {
    /// Start describing the host type `O`
    pub fn builder<O: 'static>(namespace: &str, name: &str) -> DescriptorBuilder<O> {
        DescriptorBuilder {
            descriptor: TypeDescriptor {
                name: name.to_string(),
                namespace: namespace.to_string(),
                fields: vec![],
                supertype: None,
            },
            _type: std::marker::PhantomData,
        }
    }

    /// The simple name of the type
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The namespace (package path) the type is declared in
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// The descriptor of the type this one extends, if any
    pub fn supertype(&self) -> Option<&TypeDescriptor> {
        self.supertype.as_ref().map(|s| &**s)
    }

    /// The fields declared directly on this type, including static fields
    pub fn declared_fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    /// Walk this type and each of its supertypes, most derived first
    fn hierarchy(&self) -> impl Iterator<Item = &TypeDescriptor> {
        successors(Some(self), |t| t.supertype())
    }

    /// Every instance field of this type, derived fields before inherited
    /// ones. Each returned field is marked accessible.
    pub fn all_fields(&self) -> Vec<&FieldDescriptor> {
        self.hierarchy()
            .flat_map(|t| t.fields.iter())
            .filter(|f| !f.is_static)
            .inspect(|f| f.mark_accessible())
            .collect()
    }

    /// Find the first instance field matching the selector, searching derived
    /// types before their supertypes. The field is marked accessible.
    pub fn find_field(&self, selector: Selector) -> Option<&FieldDescriptor> {
        let found = self
            .hierarchy()
            .flat_map(|t| t.fields.iter())
            .find(|f| !f.is_static && selector.matches(f))?;

        found.mark_accessible();
        Some(found)
    }

    /// Find every instance field matching the selector, in declaration order
    /// with derived fields first. Each returned field is marked accessible.
    pub fn find_fields(&self, selector: Selector) -> Vec<&FieldDescriptor> {
        self.hierarchy()
            .flat_map(|t| t.fields.iter())
            .filter(|f| !f.is_static && selector.matches(f))
            .inspect(|f| f.mark_accessible())
            .collect()
    }

    /// Pick the field at `position` from the fields matching the selector
    pub fn field_at(&self, selector: Selector, position: usize) -> Result<&FieldDescriptor> {
        let fields = self.find_fields(selector);
        let len = fields.len();
        fields
            .into_iter()
            .nth(position)
            .ok_or(Error::OutOfRange { position, len })
    }
}

/// A builder describing the fields of the host type `O`
pub struct DescriptorBuilder<O> {
    descriptor: TypeDescriptor,
    _type: std::marker::PhantomData<fn(O)>,
}

impl<O: 'static> DescriptorBuilder<O> {
    fn push(
        mut self,
        name: &str,
        declared: TypeKey,
        public: bool,
        getter: Option<Getter>,
        setter: Option<Setter>,
        object: Option<ObjectGetter>,
    ) -> Self {
        self.descriptor.fields.push(FieldDescriptor {
            name: name.to_string(),
            declared,
            is_static: false,
            public,
            accessible: AtomicBool::new(false),
            getter,
            setter,
            object,
        });
        self
    }

    fn plain<F>(
        self,
        name: &str,
        public: bool,
        get: fn(&O) -> &F,
        get_mut: fn(&mut O) -> &mut F,
    ) -> Self
    where
        F: Clone + Send + 'static,
    {
        let getter_name = name.to_string();
        let setter_name = name.to_string();
        let getter: Getter = Box::new(move |any: &dyn Any| {
            let value = get(downcast::<O>(any, &getter_name)?).clone();
            Ok(Some(Box::new(value) as Value))
        });
        let setter: Setter = Box::new(move |any: &mut dyn Any, value: Value| {
            let target = get_mut(downcast_mut::<O>(any, &setter_name)?);
            let value = value.downcast::<F>().map_err(|_| {
                Error::InvalidArgument(format!(
                    "cannot assign to field {} of type {}",
                    setter_name,
                    std::any::type_name::<F>()
                ))
            })?;
            *target = *value;
            Ok(())
        });

        self.push(name, TypeKey::of::<F>(), public, Some(getter), Some(setter), None)
    }

    /// Declare a private instance field
    pub fn field<F>(self, name: &str, get: fn(&O) -> &F, get_mut: fn(&mut O) -> &mut F) -> Self
    where
        F: Clone + Send + 'static,
    {
        self.plain(name, false, get, get_mut)
    }

    /// Declare a public instance field
    pub fn public_field<F>(
        self,
        name: &str,
        get: fn(&O) -> &F,
        get_mut: fn(&mut O) -> &mut F,
    ) -> Self
    where
        F: Clone + Send + 'static,
    {
        self.plain(name, true, get, get_mut)
    }

    /// Declare a read-only field which may be unset. This suits host fields
    /// populated later by other threads.
    pub fn nullable<F>(self, name: &str, get: fn(&O) -> Option<F>) -> Self
    where
        F: Send + 'static,
    {
        let getter_name = name.to_string();
        let getter: Getter = Box::new(move |any: &dyn Any| {
            Ok(get(downcast::<O>(any, &getter_name)?).map(|v| Box::new(v) as Value))
        });

        self.push(name, TypeKey::of::<F>(), false, Some(getter), None, None)
    }

    /// Declare a read-only field holding another host object, which may be
    /// unset
    pub fn object<F>(self, name: &str, get: fn(&O) -> Option<F>) -> Self
    where
        F: Reflect + Clone,
    {
        let getter_name = name.to_string();
        let object_name = name.to_string();
        let getter: Getter = Box::new(move |any: &dyn Any| {
            Ok(get(downcast::<O>(any, &getter_name)?).map(|v| Box::new(v) as Value))
        });
        let object: ObjectGetter = Box::new(move |any: &dyn Any| {
            Ok(get(downcast::<O>(any, &object_name)?).map(|v| Arc::new(v) as Object))
        });

        self.push(name, TypeKey::of::<F>(), false, Some(getter), None, Some(object))
    }

    /// Declare a static field. Static fields count as declared fields but are
    /// never matched by lookups.
    pub fn static_field<F: 'static>(mut self, name: &str) -> Self {
        self.descriptor.fields.push(FieldDescriptor {
            name: name.to_string(),
            declared: TypeKey::of::<F>(),
            is_static: true,
            public: true,
            accessible: AtomicBool::new(true),
            getter: None,
            setter: None,
            object: None,
        });
        self
    }

    /// Declare that `O` extends `P`, which is embedded in `O` and reachable
    /// through the given accessors
    pub fn extends<P: 'static>(
        mut self,
        parent: TypeDescriptor,
        up: fn(&O) -> &P,
        up_mut: fn(&mut O) -> &mut P,
    ) -> Self {
        self.descriptor.supertype = Some(Box::new(project(parent, up, up_mut)));
        self
    }

    /// Finish the descriptor
    pub fn build(self) -> TypeDescriptor {
        self.descriptor
    }
}

/// Re-root a whole descriptor hierarchy onto the embedding type `O`
fn project<O: 'static, P: 'static>(
    descriptor: TypeDescriptor,
    up: fn(&O) -> &P,
    up_mut: fn(&mut O) -> &mut P,
) -> TypeDescriptor {
    TypeDescriptor {
        fields: descriptor
            .fields
            .into_iter()
            .map(|f| f.project(up, up_mut))
            .collect(),
        supertype: descriptor
            .supertype
            .map(|s| Box::new(project(*s, up, up_mut))),
        ..descriptor
    }
}

/// A memoized table of descriptors keyed by concrete type
#[derive(Default)]
pub struct Registry {
    types: RwLock<HashMap<TypeId, Arc<TypeDescriptor>>>,
}

impl Registry {
    /// Get the descriptor for the concrete type of `obj`, describing the type
    /// on first use
    pub fn resolve(&self, obj: &dyn Reflect) -> Arc<TypeDescriptor> {
        let key = obj.as_any().type_id();

        if let Some(descriptor) = self
            .types
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
        {
            return Arc::clone(descriptor);
        }

        let descriptor = Arc::new(obj.describe());
        trace!(
            "Described host type {}.{} ({} declared fields)",
            descriptor.namespace,
            descriptor.name,
            descriptor.fields.len()
        );

        Arc::clone(
            self.types
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .entry(key)
                .or_insert(descriptor),
        )
    }

    /// The number of types described so far
    pub fn len(&self) -> usize {
        self.types.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Whether no types have been described yet
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

lazy_static! {
    static ref REGISTRY: Registry = Registry::default();
}

/// Get the descriptor for the concrete type of `obj` from the process-wide
/// registry
pub fn descriptor_of(obj: &dyn Reflect) -> Arc<TypeDescriptor> {
    REGISTRY.resolve(obj)
}

/// Declare a host struct along with its `Reflect` implementation. Every field
/// is declared private, in the order listed.
///
/// # Examples
///
/// ```
/// pipetap::host_type! {
///     #[derive(Debug, Clone)]
///     pub struct PacketPlayInChat("net.minecraft.server") {
///         pub message: String,
///     }
/// }
///
/// let packet = PacketPlayInChat { message: "hello".to_string() };
/// let descriptor = pipetap::introspect::descriptor_of(&packet);
/// assert_eq!(descriptor.name(), "PacketPlayInChat");
/// ```
#[macro_export]
macro_rules! host_type {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident ($namespace:literal) {
            $(
                $fvis:vis $field:ident : $ty:ty
            ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        $vis struct $name {
            $( $fvis $field: $ty ),*
        }

        impl $crate::introspect::Reflect for $name {
            fn describe(&self) -> $crate::introspect::TypeDescriptor {
                $crate::introspect::TypeDescriptor::builder::<Self>($namespace, stringify!($name))
                    $( .field::<$ty>(stringify!($field), |o| &o.$field, |o| &mut o.$field) )*
                    .build()
            }

            fn as_any(&self) -> &dyn ::std::any::Any {
                self
            }

            fn as_any_mut(&mut self) -> &mut dyn ::std::any::Any {
                self
            }
        }
    };
}
