//! Type annotations and the predicates both engines dispatch on.
//!
//! A [`TypeExpr`] is the runtime description of a field's declared type:
//! scalars, containers, unions, enums, records, named opaque types and type
//! variables. Rust types describe themselves through the [`Typed`] trait so
//! schemas can be written as `Field::new::<Vec<i64>>("xs")`.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;

use indexmap::IndexMap;

use crate::schema::{Record, RecordSchema};
use crate::value::Value;

/// Filesystem paths, decoded from strings.
pub const PATH: NamedType = NamedType::new("path");

/// An opaque type identified by name, optionally declaring its ancestors.
///
/// Decoders registered for an ancestor with `include_subclasses` also apply
/// to every type listing it in `bases`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NamedType {
    pub name: &'static str,
    pub bases: &'static [&'static str],
}

impl NamedType {
    pub const fn new(name: &'static str) -> Self {
        Self { name, bases: &[] }
    }

    pub const fn with_bases(name: &'static str, bases: &'static [&'static str]) -> Self {
        Self { name, bases }
    }
}

/// An enumeration decoded from one of its member names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EnumType {
    pub name: &'static str,
    pub members: &'static [&'static str],
}

impl EnumType {
    pub fn member(&self, name: &str) -> Option<&'static str> {
        self.members.iter().copied().find(|m| *m == name)
    }
}

/// A reference to a [`Record`] type. Its schema is produced on demand, so
/// self-referencing records can be described.
#[derive(Clone, Copy)]
pub struct RecordType {
    type_name: &'static str,
    schema: fn() -> RecordSchema,
}

impl RecordType {
    pub fn of<R: Record>() -> Self {
        Self {
            type_name: std::any::type_name::<R>(),
            schema: R::schema,
        }
    }

    /// Fully qualified Rust type name; the record's identity.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Last path segment of the type name, for messages.
    pub fn name(&self) -> &'static str {
        let base = self
            .type_name
            .split_once('<')
            .map_or(self.type_name, |(head, _)| head);
        base.rsplit("::").next().unwrap_or(base)
    }

    pub fn schema(&self) -> RecordSchema {
        (self.schema)()
    }
}

impl fmt::Debug for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RecordType").field(&self.type_name).finish()
    }
}

impl PartialEq for RecordType {
    fn eq(&self, other: &Self) -> bool {
        self.type_name == other.type_name
    }
}

impl Eq for RecordType {}

impl Hash for RecordType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_name.hash(state);
    }
}

/// A generic type parameter, possibly bounded.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeVar {
    pub name: &'static str,
    pub bound: Option<Box<TypeExpr>>,
}

/// Runtime description of a declared type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeExpr {
    Any,
    None,
    Str,
    Int,
    Float,
    Bool,
    Bytes,
    Named(NamedType),
    Record(RecordType),
    Enum(EnumType),
    List(Box<TypeExpr>),
    /// Fixed-arity tuple, one type per position.
    Tuple(Vec<TypeExpr>),
    /// Homogeneous tuple of any length.
    VarTuple(Box<TypeExpr>),
    Set(Box<TypeExpr>),
    Map(Box<TypeExpr>, Box<TypeExpr>),
    Union(Vec<TypeExpr>),
    Var(TypeVar),
}

impl TypeExpr {
    pub fn of<T: Typed + ?Sized>() -> Self {
        T::type_expr()
    }

    pub fn record<R: Record>() -> Self {
        TypeExpr::Record(RecordType::of::<R>())
    }

    pub fn enumeration(name: &'static str, members: &'static [&'static str]) -> Self {
        TypeExpr::Enum(EnumType { name, members })
    }

    pub fn named(named: NamedType) -> Self {
        TypeExpr::Named(named)
    }

    pub fn list(item: TypeExpr) -> Self {
        TypeExpr::List(Box::new(item))
    }

    pub fn set(item: TypeExpr) -> Self {
        TypeExpr::Set(Box::new(item))
    }

    pub fn var_tuple(item: TypeExpr) -> Self {
        TypeExpr::VarTuple(Box::new(item))
    }

    pub fn map(key: TypeExpr, value: TypeExpr) -> Self {
        TypeExpr::Map(Box::new(key), Box::new(value))
    }

    pub fn var(name: &'static str, bound: Option<TypeExpr>) -> Self {
        TypeExpr::Var(TypeVar {
            name,
            bound: bound.map(Box::new),
        })
    }

    /// `inner | none`. An inner union gains a `none` branch instead of
    /// being nested.
    pub fn optional(inner: TypeExpr) -> Self {
        match inner {
            TypeExpr::Union(mut branches) => {
                if !branches.contains(&TypeExpr::None) {
                    branches.push(TypeExpr::None);
                }
                TypeExpr::Union(branches)
            }
            TypeExpr::None => TypeExpr::None,
            other => TypeExpr::Union(vec![other, TypeExpr::None]),
        }
    }

    /// Follows bounded type variables to their bound.
    pub fn resolved(&self) -> &TypeExpr {
        match self {
            TypeExpr::Var(TypeVar {
                bound: Some(bound), ..
            }) => bound.resolved(),
            other => other,
        }
    }

    /// Like [`resolved`](Self::resolved), but an unbound variable becomes
    /// [`TypeExpr::Any`].
    pub fn concrete(&self) -> TypeExpr {
        match self.resolved() {
            TypeExpr::Var(_) => TypeExpr::Any,
            other => other.clone(),
        }
    }

    pub fn is_any(&self) -> bool {
        matches!(self.resolved(), TypeExpr::Any)
    }

    pub fn is_bool(&self) -> bool {
        matches!(self.resolved(), TypeExpr::Bool)
    }

    pub fn is_list(&self) -> bool {
        matches!(self.resolved(), TypeExpr::List(_))
    }

    pub fn is_tuple(&self) -> bool {
        matches!(self.resolved(), TypeExpr::Tuple(_) | TypeExpr::VarTuple(_))
    }

    pub fn is_fixed_tuple(&self) -> bool {
        matches!(self.resolved(), TypeExpr::Tuple(_))
    }

    pub fn is_variadic_tuple(&self) -> bool {
        matches!(self.resolved(), TypeExpr::VarTuple(_))
    }

    pub fn is_set(&self) -> bool {
        matches!(self.resolved(), TypeExpr::Set(_))
    }

    pub fn is_map(&self) -> bool {
        matches!(self.resolved(), TypeExpr::Map(..))
    }

    pub fn is_union(&self) -> bool {
        matches!(self.resolved(), TypeExpr::Union(_))
    }

    pub fn is_enum(&self) -> bool {
        matches!(self.resolved(), TypeExpr::Enum(_))
    }

    pub fn is_record(&self) -> bool {
        matches!(self.resolved(), TypeExpr::Record(_))
    }

    /// A union with a `none` branch.
    pub fn is_optional(&self) -> bool {
        match self.resolved() {
            TypeExpr::Union(branches) => branches.contains(&TypeExpr::None),
            _ => false,
        }
    }

    /// Type arguments of a parameterized type, empty for anything else.
    pub fn type_arguments(&self) -> Vec<TypeExpr> {
        match self.resolved() {
            TypeExpr::List(item) | TypeExpr::Set(item) | TypeExpr::VarTuple(item) => {
                vec![(**item).clone()]
            }
            TypeExpr::Tuple(items) | TypeExpr::Union(items) => items.clone(),
            TypeExpr::Map(key, value) => vec![(**key).clone(), (**value).clone()],
            _ => Vec::new(),
        }
    }

    /// Element type of a list, set or variadic tuple.
    pub fn item_type(&self) -> Option<TypeExpr> {
        match self.resolved() {
            TypeExpr::List(item) | TypeExpr::Set(item) | TypeExpr::VarTuple(item) => {
                Some(item.concrete())
            }
            _ => None,
        }
    }

    /// True when a record type is reachable through sequence, tuple, set or
    /// union nesting.
    pub fn contains_record(&self) -> bool {
        match self.resolved() {
            TypeExpr::List(item) | TypeExpr::Set(item) | TypeExpr::VarTuple(item) => {
                item.is_record() || item.contains_record()
            }
            TypeExpr::Tuple(items) | TypeExpr::Union(items) => items
                .iter()
                .any(|item| item.is_record() || item.contains_record()),
            _ => false,
        }
    }

    /// The single record branch of a union, if there is exactly one.
    pub fn record_arg(&self) -> Option<RecordType> {
        let TypeExpr::Union(branches) = self.resolved() else {
            return None;
        };
        let mut records = branches.iter().filter_map(|b| match b.resolved() {
            TypeExpr::Record(record) => Some(*record),
            _ => None,
        });
        match (records.next(), records.next()) {
            (Some(record), None) => Some(record),
            _ => None,
        }
    }

    /// Lists, tuples and sets whose elements are (or contain) records.
    pub fn is_container_of_records(&self) -> bool {
        match self.resolved() {
            TypeExpr::List(_) | TypeExpr::Set(_) | TypeExpr::VarTuple(_) | TypeExpr::Tuple(_) => {
                self.contains_record()
            }
            _ => false,
        }
    }

    /// Declared ancestors of a named type.
    pub fn bases(&self) -> &'static [&'static str] {
        match self.resolved() {
            TypeExpr::Named(named) => named.bases,
            _ => &[],
        }
    }

    /// Identifying name for named types, enums and records.
    pub fn name(&self) -> Option<&'static str> {
        match self.resolved() {
            TypeExpr::Named(named) => Some(named.name),
            TypeExpr::Enum(e) => Some(e.name),
            TypeExpr::Record(r) => Some(r.name()),
            _ => None,
        }
    }
}

fn write_joined(f: &mut fmt::Formatter<'_>, items: &[TypeExpr], sep: &str) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(sep)?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

impl fmt::Display for TypeExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeExpr::Any => f.write_str("any"),
            TypeExpr::None => f.write_str("none"),
            TypeExpr::Str => f.write_str("str"),
            TypeExpr::Int => f.write_str("int"),
            TypeExpr::Float => f.write_str("float"),
            TypeExpr::Bool => f.write_str("bool"),
            TypeExpr::Bytes => f.write_str("bytes"),
            TypeExpr::Named(named) => f.write_str(named.name),
            TypeExpr::Record(record) => f.write_str(record.name()),
            TypeExpr::Enum(e) => f.write_str(e.name),
            TypeExpr::List(item) => write!(f, "list[{item}]"),
            TypeExpr::Tuple(items) if items.is_empty() => f.write_str("tuple[()]"),
            TypeExpr::Tuple(items) => {
                f.write_str("tuple[")?;
                write_joined(f, items, ", ")?;
                f.write_str("]")
            }
            TypeExpr::VarTuple(item) => write!(f, "tuple[{item}, ...]"),
            TypeExpr::Set(item) => write!(f, "set[{item}]"),
            TypeExpr::Map(key, value) => write!(f, "dict[{key}, {value}]"),
            TypeExpr::Union(branches) => write_joined(f, branches, " | "),
            TypeExpr::Var(var) => f.write_str(var.name),
        }
    }
}

/// Rust types that can describe their own [`TypeExpr`].
///
/// Records implement it with [`typed_records!`](crate::typed_records).
pub trait Typed {
    fn type_expr() -> TypeExpr;
}

macro_rules! typed_as {
    ($expr:expr => $($ty:ty),+ $(,)?) => {
        $(
            impl Typed for $ty {
                fn type_expr() -> TypeExpr {
                    $expr
                }
            }
        )+
    };
}

typed_as!(TypeExpr::Int => i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);
typed_as!(TypeExpr::Float => f32, f64);
typed_as!(TypeExpr::Bool => bool);
typed_as!(TypeExpr::Str => String, char);
typed_as!(TypeExpr::Named(PATH) => PathBuf);
typed_as!(TypeExpr::Any => Value);

impl<T: Typed> Typed for Vec<T> {
    fn type_expr() -> TypeExpr {
        TypeExpr::list(T::type_expr())
    }
}

impl<T: Typed> Typed for VecDeque<T> {
    fn type_expr() -> TypeExpr {
        TypeExpr::list(T::type_expr())
    }
}

impl<T: Typed, S> Typed for HashSet<T, S> {
    fn type_expr() -> TypeExpr {
        TypeExpr::set(T::type_expr())
    }
}

impl<T: Typed> Typed for BTreeSet<T> {
    fn type_expr() -> TypeExpr {
        TypeExpr::set(T::type_expr())
    }
}

impl<K: Typed, V: Typed, S> Typed for HashMap<K, V, S> {
    fn type_expr() -> TypeExpr {
        TypeExpr::map(K::type_expr(), V::type_expr())
    }
}

impl<K: Typed, V: Typed> Typed for BTreeMap<K, V> {
    fn type_expr() -> TypeExpr {
        TypeExpr::map(K::type_expr(), V::type_expr())
    }
}

impl<K: Typed, V: Typed, S> Typed for IndexMap<K, V, S> {
    fn type_expr() -> TypeExpr {
        TypeExpr::map(K::type_expr(), V::type_expr())
    }
}

impl<T: Typed> Typed for Option<T> {
    fn type_expr() -> TypeExpr {
        TypeExpr::optional(T::type_expr())
    }
}

impl<T: Typed> Typed for Box<T> {
    fn type_expr() -> TypeExpr {
        T::type_expr()
    }
}

impl Typed for () {
    fn type_expr() -> TypeExpr {
        TypeExpr::Tuple(Vec::new())
    }
}

macro_rules! typed_tuple {
    ($($name:ident),+) => {
        impl<$($name: Typed),+> Typed for ($($name,)+) {
            fn type_expr() -> TypeExpr {
                TypeExpr::Tuple(vec![$($name::type_expr()),+])
            }
        }
    };
}

typed_tuple!(A);
typed_tuple!(A, B);
typed_tuple!(A, B, C);
typed_tuple!(A, B, C, D);
typed_tuple!(A, B, C, D, E);
typed_tuple!(A, B, C, D, E, F);

/// Implements [`Typed`] for record types.
///
/// ```ignore
/// structfig::typed_records!(TrainConfig, LogConfig);
/// ```
#[macro_export]
macro_rules! typed_records {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl $crate::Typed for $ty {
                fn type_expr() -> $crate::TypeExpr {
                    $crate::TypeExpr::record::<$ty>()
                }
            }
        )+
    };
}
