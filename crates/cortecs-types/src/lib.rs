//! Type representations for cortecs.
//!
//! This crate defines the semantic types produced by environment generation
//! and the substitution store the unifier extends. Unification itself lives
//! in `cortecs-infer`; here are only the data and the operations that read
//! it (`find`, `point_at`, `apply`).
//!
//! Every type node carries a [`TypeId`]. The id is the join key between a
//! type and the source spans that produced it. It is never used for
//! equality: two types are equal when they are structurally equal.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::ops::Add;
use std::sync::atomic::{AtomicU64, Ordering};

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Globally unique id of a type node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(pub u64);

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Global counter handing out blocks of type ids.
///
/// Each [`IdAllocator`] takes a whole block at a time so that the atomic
/// increment happens once per block rather than once per id, and so that
/// allocators owned by different threads never mint the same id.
static NEXT_ID_BLOCK: AtomicU64 = AtomicU64::new(0);

pub const ID_BLOCK_SIZE: u64 = 1024;

fn alloc_id_block() -> u64 {
    let start = NEXT_ID_BLOCK.fetch_add(ID_BLOCK_SIZE, Ordering::Relaxed);
    tracing::trace!(start, size = ID_BLOCK_SIZE, "allocated type id block");
    start
}

/// Mints fresh, monotonically increasing type ids.
#[derive(Debug)]
pub struct IdAllocator {
    next: u64,
    end: u64,
}

impl IdAllocator {
    pub fn new() -> Self {
        let start = alloc_id_block();
        Self {
            next: start,
            end: start + ID_BLOCK_SIZE,
        }
    }

    /// Create an allocator with a pinned starting id.
    ///
    /// Production code should use `new()`. This constructor exists for
    /// tests that need deterministic ids; the pinned range is unbounded and
    /// does not coordinate with the global counter.
    pub fn starting_at(first: u64) -> Self {
        Self {
            next: first,
            end: u64::MAX,
        }
    }

    pub fn next_id(&mut self) -> TypeId {
        if self.next == self.end {
            self.next = alloc_id_block();
            self.end = self.next + ID_BLOCK_SIZE;
        }
        let id = TypeId(self.next);
        self.next += 1;
        id
    }
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Type variables
// ---------------------------------------------------------------------------

/// A fresh placeholder created during inference. The substitution binds
/// these and only these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UnificationVar(pub TypeId);

/// A variable introduced by an explicit type annotation. Never rebound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UserVar(pub TypeId);

/// Either kind of type variable, as quantified by a [`Type::Scheme`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TypeVariable {
    Unification(UnificationVar),
    UserDefined(UserVar),
}

impl TypeVariable {
    pub fn id(self) -> TypeId {
        match self {
            TypeVariable::Unification(v) => v.0,
            TypeVariable::UserDefined(v) => v.0,
        }
    }

    pub fn to_type(self) -> Type {
        match self {
            TypeVariable::Unification(v) => Type::Unification(v),
            TypeVariable::UserDefined(v) => Type::UserDefined(v),
        }
    }
}

impl fmt::Display for TypeVariable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeVariable::Unification(v) => write!(f, "t{}", v.0),
            TypeVariable::UserDefined(v) => write!(f, "'u{}", v.0),
        }
    }
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A fixed, non-parametric type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ConcreteType {
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
    Char,
    String,
    Unit,
}

impl ConcreteType {
    pub fn name(self) -> &'static str {
        match self {
            ConcreteType::I8 => "i8",
            ConcreteType::I16 => "i16",
            ConcreteType::I32 => "i32",
            ConcreteType::I64 => "i64",
            ConcreteType::U8 => "u8",
            ConcreteType::U16 => "u16",
            ConcreteType::U32 => "u32",
            ConcreteType::U64 => "u64",
            ConcreteType::F32 => "f32",
            ConcreteType::F64 => "f64",
            ConcreteType::Char => "char",
            ConcreteType::String => "string",
            ConcreteType::Unit => "unit",
        }
    }

    /// Look up a concrete type by its source name.
    pub fn from_name(name: &str) -> Option<Self> {
        let kind = match name {
            "i8" => ConcreteType::I8,
            "i16" => ConcreteType::I16,
            "i32" => ConcreteType::I32,
            "i64" => ConcreteType::I64,
            "u8" => ConcreteType::U8,
            "u16" => ConcreteType::U16,
            "u32" => ConcreteType::U32,
            "u64" => ConcreteType::U64,
            "f32" => ConcreteType::F32,
            "f64" => ConcreteType::F64,
            "char" => ConcreteType::Char,
            "string" => ConcreteType::String,
            "unit" => ConcreteType::Unit,
            _ => return None,
        };
        Some(kind)
    }
}

/// A semantic type.
///
/// Equality ignores ids: `Concrete` compares its kind, composites compare
/// their components, variables compare the variable, and all `Invalid`
/// values are equal to each other.
#[derive(Debug, Clone)]
pub enum Type {
    Concrete {
        id: TypeId,
        kind: ConcreteType,
    },
    /// Function type `domain -> codomain`.
    Arrow {
        id: TypeId,
        domain: Box<Type>,
        codomain: Box<Type>,
    },
    /// Tuple or argument-list type. Arity is significant.
    Product {
        id: TypeId,
        components: Vec<Type>,
    },
    Unification(UnificationVar),
    UserDefined(UserVar),
    /// `forall bound. body`.
    Scheme {
        id: TypeId,
        bound: Vec<TypeVariable>,
        body: Box<Type>,
    },
    /// Placeholder left behind by a failed unification. Keeps the id of the
    /// type it replaces so span lookups still resolve.
    Invalid(TypeId),
}

impl PartialEq for Type {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Type::Concrete { kind: a, .. }, Type::Concrete { kind: b, .. }) => a == b,
            (
                Type::Arrow {
                    domain: d1,
                    codomain: c1,
                    ..
                },
                Type::Arrow {
                    domain: d2,
                    codomain: c2,
                    ..
                },
            ) => d1 == d2 && c1 == c2,
            (Type::Product { components: a, .. }, Type::Product { components: b, .. }) => a == b,
            (Type::Unification(a), Type::Unification(b)) => a == b,
            (Type::UserDefined(a), Type::UserDefined(b)) => a == b,
            (
                Type::Scheme {
                    bound: b1, body: t1, ..
                },
                Type::Scheme {
                    bound: b2, body: t2, ..
                },
            ) => b1 == b2 && t1 == t2,
            (Type::Invalid(_), Type::Invalid(_)) => true,
            _ => false,
        }
    }
}

impl Eq for Type {}

impl Type {
    pub fn concrete(ids: &mut IdAllocator, kind: ConcreteType) -> Self {
        Type::Concrete {
            id: ids.next_id(),
            kind,
        }
    }

    pub fn arrow(ids: &mut IdAllocator, domain: Type, codomain: Type) -> Self {
        Type::Arrow {
            id: ids.next_id(),
            domain: Box::new(domain),
            codomain: Box::new(codomain),
        }
    }

    pub fn product(ids: &mut IdAllocator, components: Vec<Type>) -> Self {
        Type::Product {
            id: ids.next_id(),
            components,
        }
    }

    pub fn scheme(ids: &mut IdAllocator, bound: Vec<TypeVariable>, body: Type) -> Self {
        Type::Scheme {
            id: ids.next_id(),
            bound,
            body: Box::new(body),
        }
    }

    /// A fresh, unbound unification variable.
    pub fn fresh_variable(ids: &mut IdAllocator) -> Self {
        Type::Unification(UnificationVar(ids.next_id()))
    }

    pub fn user_variable(ids: &mut IdAllocator) -> Self {
        Type::UserDefined(UserVar(ids.next_id()))
    }

    pub fn id(&self) -> TypeId {
        match self {
            Type::Concrete { id, .. }
            | Type::Arrow { id, .. }
            | Type::Product { id, .. }
            | Type::Scheme { id, .. }
            | Type::Invalid(id) => *id,
            Type::Unification(v) => v.0,
            Type::UserDefined(v) => v.0,
        }
    }

    pub fn is_invalid(&self) -> bool {
        matches!(self, Type::Invalid(_))
    }

    /// The variable this type is, if it is one.
    pub fn as_variable(&self) -> Option<TypeVariable> {
        match self {
            Type::Unification(v) => Some(TypeVariable::Unification(*v)),
            Type::UserDefined(v) => Some(TypeVariable::UserDefined(*v)),
            _ => None,
        }
    }

    /// Free type variables, scheme-bound ones excluded.
    pub fn free_variables(&self) -> BTreeSet<TypeVariable> {
        let mut vars = BTreeSet::new();
        collect_free_variables(self, &mut vars);
        vars
    }

    /// Free unification variables only.
    pub fn free_unification_variables(&self) -> BTreeSet<UnificationVar> {
        self.free_variables()
            .into_iter()
            .filter_map(|v| match v {
                TypeVariable::Unification(u) => Some(u),
                TypeVariable::UserDefined(_) => None,
            })
            .collect()
    }
}

fn collect_free_variables(ty: &Type, vars: &mut BTreeSet<TypeVariable>) {
    match ty {
        Type::Concrete { .. } | Type::Invalid(_) => {}
        Type::Arrow {
            domain, codomain, ..
        } => {
            collect_free_variables(domain, vars);
            collect_free_variables(codomain, vars);
        }
        Type::Product { components, .. } => {
            for component in components {
                collect_free_variables(component, vars);
            }
        }
        Type::Unification(v) => {
            vars.insert(TypeVariable::Unification(*v));
        }
        Type::UserDefined(v) => {
            vars.insert(TypeVariable::UserDefined(*v));
        }
        Type::Scheme { bound, body, .. } => {
            let mut inner = BTreeSet::new();
            collect_free_variables(body, &mut inner);
            vars.extend(inner.into_iter().filter(|v| !bound.contains(v)));
        }
    }
}

// ---------------------------------------------------------------------------
// Display
// ---------------------------------------------------------------------------

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Concrete { kind, .. } => write!(f, "{}", kind.name()),
            Type::Arrow {
                domain, codomain, ..
            } => write!(f, "({domain} -> {codomain})"),
            Type::Product { components, .. } => {
                write!(f, "(")?;
                for (i, component) in components.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{component}")?;
                }
                write!(f, ")")
            }
            Type::Unification(v) => write!(f, "{}", TypeVariable::Unification(*v)),
            Type::UserDefined(v) => write!(f, "{}", TypeVariable::UserDefined(*v)),
            Type::Scheme { bound, body, .. } => {
                write!(f, "forall")?;
                for var in bound {
                    write!(f, " {var}")?;
                }
                write!(f, ". {body}")
            }
            Type::Invalid(_) => write!(f, "<invalid>"),
        }
    }
}

// ---------------------------------------------------------------------------
// Substitution
// ---------------------------------------------------------------------------

/// What a unification variable maps to inside a [`Substitution`].
#[derive(Debug, Clone, PartialEq)]
pub enum Entry {
    /// The variable is (or names) its own class representative.
    Representative(UnificationVar),
    /// The variable is bound to a type.
    Mapping(Type),
    /// The variable defers to another variable's resolution.
    Intermediate(UnificationVar),
}

/// Result of [`Substitution::find`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Lookup<'a> {
    /// Still unbound; this is the canonical variable of its class.
    Representative(UnificationVar),
    Mapping(&'a Type),
}

/// Side table filled by [`Substitution::apply`]: for every variable it
/// resolved, the id of the resolved type maps back to the variable it was
/// resolved from.
pub type IdMapping = BTreeMap<TypeId, Type>;

/// Persistent store of variable bindings.
///
/// A substitution is a value: extending it (`point_at`, `+`) returns a new
/// substitution and leaves the receiver untouched. Following `Intermediate`
/// entries from any variable always ends at a representative or a mapping.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Substitution {
    mapping: BTreeMap<UnificationVar, Entry>,
}

impl Substitution {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.mapping.is_empty()
    }

    pub fn len(&self) -> usize {
        self.mapping.len()
    }

    pub fn entries(&self) -> impl Iterator<Item = (&UnificationVar, &Entry)> {
        self.mapping.iter()
    }

    pub fn get(&self, var: UnificationVar) -> Option<&Entry> {
        self.mapping.get(&var)
    }

    /// Follow `Intermediate` redirections from `var` to its resolution.
    ///
    /// The structure is immutable, so no path compression happens; every
    /// call walks the whole chain.
    pub fn find(&self, var: UnificationVar) -> Lookup<'_> {
        let mut current = var;
        loop {
            match self.mapping.get(&current) {
                None => return Lookup::Representative(current),
                Some(Entry::Representative(rep)) => return Lookup::Representative(*rep),
                Some(Entry::Mapping(ty)) => return Lookup::Mapping(ty),
                Some(Entry::Intermediate(dst)) => current = *dst,
            }
        }
    }

    /// Bind `src` to `dst`.
    ///
    /// A variable target is recorded as a redirection so `src` follows
    /// whatever `dst` is later bound to. Binding a variable to itself is a
    /// no-op.
    pub fn point_at(&self, src: UnificationVar, dst: &Type) -> Substitution {
        let entry = match dst {
            Type::Unification(v) if *v == src => return self.clone(),
            Type::Unification(v) => Entry::Intermediate(*v),
            // TODO: no occurs check yet; binding `src` inside `dst` makes
            // `apply` diverge. Decide whether recursive types are rejected
            // here or by the parser.
            _ => Entry::Mapping(dst.clone()),
        };
        let mut mapping = self.mapping.clone();
        mapping.insert(src, entry);
        Substitution { mapping }
    }

    /// Resolve `ty` fully through this substitution, producing a new tree.
    ///
    /// `mapping` records, for every resolved variable, which variable the
    /// resolved type came from, keyed by the resolved type's id.
    pub fn apply(&self, ty: &Type, mapping: &mut IdMapping) -> Type {
        match ty {
            Type::Concrete { .. } | Type::UserDefined(_) | Type::Invalid(_) => ty.clone(),
            Type::Arrow {
                id,
                domain,
                codomain,
            } => Type::Arrow {
                id: *id,
                domain: Box::new(self.apply(domain, mapping)),
                codomain: Box::new(self.apply(codomain, mapping)),
            },
            Type::Product { id, components } => Type::Product {
                id: *id,
                components: components.iter().map(|c| self.apply(c, mapping)).collect(),
            },
            Type::Unification(var) => match self.find(*var) {
                Lookup::Representative(rep) => {
                    if rep != *var {
                        mapping.insert(rep.0, ty.clone());
                    }
                    Type::Unification(rep)
                }
                Lookup::Mapping(bound) => {
                    let resolved = self.apply(bound, mapping);
                    mapping.insert(resolved.id(), ty.clone());
                    resolved
                }
            },
            Type::Scheme { id, bound, body } => {
                // Bound variables that have since been resolved are no
                // longer quantified; a scheme with nothing left collapses
                // to its body.
                let mut still_free: Vec<TypeVariable> = bound
                    .iter()
                    .filter_map(|var| self.apply(&var.to_type(), mapping).as_variable())
                    .collect();
                still_free.sort_by_key(|v| v.id());
                still_free.dedup();

                let body = self.apply(body, mapping);
                if still_free.is_empty() {
                    body
                } else {
                    Type::Scheme {
                        id: *id,
                        bound: still_free,
                        body: Box::new(body),
                    }
                }
            }
        }
    }

    /// [`Substitution::apply`] without keeping the id side table.
    pub fn resolve(&self, ty: &Type) -> Type {
        self.apply(ty, &mut IdMapping::new())
    }
}

impl Add for Substitution {
    type Output = Substitution;

    /// Union of both substitutions; entries of `rhs` win on conflict.
    fn add(mut self, rhs: Substitution) -> Substitution {
        self.mapping.extend(rhs.mapping);
        self
    }
}
