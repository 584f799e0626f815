//! Core types.
//!
//! Types are a plain tree: constructors, variables, functions, type
//! application, and universal quantification. The only query analyses need
//! is head-constructor resolution — walking through `App` and `Forall` to
//! the named constructor, if any.

use crate::name::Name;

/// A type variable, identified by a unique integer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeVar(pub u32);

/// A Core type.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Ty {
    /// A named type constructor: `int`, `list`, `reuse`.
    Con(Name),
    /// An (unresolved) type variable.
    Var(TypeVar),
    /// A function type.
    Fun(Vec<Ty>, Box<Ty>),
    /// Type application: `list<int>`.
    App(Box<Ty>, Vec<Ty>),
    /// Universal quantification.
    Forall(Vec<TypeVar>, Box<Ty>),
}

impl Ty {
    /// Function type helper.
    pub fn fun(params: Vec<Ty>, result: Ty) -> Ty {
        Ty::Fun(params, Box::new(result))
    }

    /// Apply a head type to arguments.
    pub fn app(head: Ty, args: Vec<Ty>) -> Ty {
        Ty::App(Box::new(head), args)
    }

    /// Resolve the head type constructor, looking through application and
    /// quantification. `None` for variables and function types.
    pub fn head_con(&self) -> Option<&Name> {
        match self {
            Ty::Con(name) => Some(name),
            Ty::App(head, _) => head.head_con(),
            Ty::Forall(_, body) => body.head_con(),
            Ty::Var(_) | Ty::Fun(..) => None,
        }
    }

    /// `true` when the type is a function after stripping quantifiers.
    pub fn is_fun(&self) -> bool {
        match self {
            Ty::Fun(..) => true,
            Ty::Forall(_, body) => body.is_fun(),
            _ => false,
        }
    }

    // ── Well-known type constructors ────────────────────────────────

    pub fn type_unit() -> Ty {
        Ty::Con(Name::qualified("core/types", "unit"))
    }

    pub fn type_bool() -> Ty {
        Ty::Con(Name::qualified("core/types", "bool"))
    }

    pub fn type_int() -> Ty {
        Ty::Con(Name::qualified("core/types", "int"))
    }

    pub fn type_char() -> Ty {
        Ty::Con(Name::qualified("core/types", "char"))
    }

    pub fn type_float() -> Ty {
        Ty::Con(Name::qualified("core/types", "float"))
    }

    pub fn type_string() -> Ty {
        Ty::Con(Name::qualified("core/types", "string"))
    }

    /// The reuse-token type produced by `drop_reuse` / `no_reuse` and
    /// consumed by `alloc_at`.
    pub fn type_reuse() -> Ty {
        Ty::Con(Name::qualified("core/types", "reuse"))
    }

    /// Substitute type variables, used when applying a `Forall`.
    pub fn subst_vars(&self, sub: &[(TypeVar, Ty)]) -> Ty {
        match self {
            Ty::Con(_) => self.clone(),
            Ty::Var(v) => sub
                .iter()
                .find(|(var, _)| var == v)
                .map_or_else(|| self.clone(), |(_, ty)| ty.clone()),
            Ty::Fun(params, result) => Ty::Fun(
                params.iter().map(|p| p.subst_vars(sub)).collect(),
                Box::new(result.subst_vars(sub)),
            ),
            Ty::App(head, args) => Ty::App(
                Box::new(head.subst_vars(sub)),
                args.iter().map(|a| a.subst_vars(sub)).collect(),
            ),
            Ty::Forall(vars, body) => {
                // Inner quantifiers shadow the substitution.
                let inner: Vec<(TypeVar, Ty)> = sub
                    .iter()
                    .filter(|(v, _)| !vars.contains(v))
                    .cloned()
                    .collect();
                Ty::Forall(vars.clone(), Box::new(body.subst_vars(&inner)))
            }
        }
    }

    /// Instantiate a quantified type with the given arguments. Non-quantified
    /// types are returned unchanged.
    pub fn instantiate(&self, args: &[Ty]) -> Ty {
        match self {
            Ty::Forall(vars, body) => {
                let sub: Vec<(TypeVar, Ty)> =
                    vars.iter().copied().zip(args.iter().cloned()).collect();
                body.subst_vars(&sub)
            }
            _ => self.clone(),
        }
    }
}
