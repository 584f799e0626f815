//! The reference-counting rewrite over Core expressions.
//!
//! Places `dup`/`drop` calls precisely using per-expression liveness and
//! ownership: every counted value is consumed exactly once at its last
//! use, and every additional use gets a `dup`.
//!
//! # Algorithm
//!
//! The tree is walked post-order and **right-to-left** — argument lists,
//! definition groups, and branch guards are processed in reverse, and a
//! `let` is processed body first. Names already visited are therefore
//! exactly the names evaluated *later* at runtime, and the live set reads
//! as "still needed downstream":
//!
//! - **Variable use**: mark the name live. If it was already live, or the
//!   current scope does not own it, wrap the occurrence in `dup`;
//!   otherwise the occurrence is the last use of an owned name and moves.
//! - **Lambda**: the body runs in an empty live set owning exactly the
//!   captured free locals plus the parameters; dead parameters are dropped
//!   at entry. Each capture is then duplicated in the enclosing scope —
//!   the closure owns its captures, so every construction retains each
//!   one.
//! - **Let**: the body is analyzed while the binding is owned; a binding
//!   the body leaves dead is dropped right after it is made.
//! - **Case**: branches are analyzed in isolation against the liveness at
//!   the match, then finalized once the union of all branch requirements
//!   is known: each guard drops what the other paths (or the code after
//!   the match) keep alive but it does not consume.
//!
//! Transformation and liveness contract: after `parc_expr` returns, the
//! live set holds the names needed to evaluate the produced expression.

use rustc_hash::FxHashSet;

use keel_core::{
    free_locals, Branch, Def, DefGroup, Expr, Guard, Pattern, TName, VarInfo,
};

use crate::normalize::{is_normalized, normalize_case};
use crate::state::{Live, Parc, ParcError, ParcErrorKind};

/// Transform `items` right-to-left, returning them in source order.
pub(crate) fn reverse_map<T, U>(
    parc: &mut Parc<'_>,
    items: Vec<T>,
    mut f: impl FnMut(&mut Parc<'_>, T) -> Result<U, ParcError>,
) -> Result<Vec<U>, ParcError> {
    let mut out = Vec::with_capacity(items.len());
    for item in items.into_iter().rev() {
        out.push(f(parc, item)?);
    }
    out.reverse();
    Ok(out)
}

/// Account one use of a name. Returns the replacement occurrence when a
/// `dup` is needed, `None` when the plain occurrence stands (last use of
/// an owned name, an uncounted type, or a global).
fn use_tname(parc: &mut Parc<'_>, name: &TName) -> Result<Option<Expr>, ParcError> {
    if name.is_qualified() {
        // Globals are not reference-counted by this pass.
        return Ok(None);
    }
    let live = parc.is_live(name);
    let owned = parc.is_owned(name);
    parc.mark_live(name);
    if live || !owned {
        // Needed again downstream, or merely borrowed here: an extra
        // reference must be produced.
        parc.gen_dup(name)
    } else {
        Ok(None)
    }
}

/// Rewrite one expression. See the module docs for the contract.
pub(crate) fn parc_expr(parc: &mut Parc<'_>, expr: Expr) -> Result<Expr, ParcError> {
    match expr {
        Expr::TypeLam { params, body } => Ok(Expr::TypeLam {
            params,
            body: Box::new(parc_expr(parc, *body)?),
        }),
        Expr::TypeApp { expr, args } => Ok(Expr::TypeApp {
            expr: Box::new(parc_expr(parc, *expr)?),
            args,
        }),
        Expr::Lam { params, body } => parc_lam(parc, params, *body),
        Expr::Var { name, info } => {
            if info == VarInfo::None {
                if let Some(dup) = use_tname(parc, &name)? {
                    return Ok(dup);
                }
            }
            Ok(Expr::Var { name, info })
        }
        Expr::App { fun, args } => {
            // Arguments right-to-left: the last argument is downstream of
            // the earlier ones, and the function is upstream of them all.
            let args = reverse_map(parc, args, parc_expr)?;
            let fun = parc_expr(parc, *fun)?;
            Ok(Expr::App {
                fun: Box::new(fun),
                args,
            })
        }
        Expr::Lit(_) | Expr::Con { .. } => Ok(expr),
        Expr::Let { mut groups, body } => {
            if groups.is_empty() {
                return parc_expr(parc, *body);
            }
            let group = groups.remove(0);
            match group {
                DefGroup::NonRec(def) => {
                    let bound: Live = [def.tname()].into_iter().collect();
                    let rest = Expr::Let { groups, body };
                    let rest =
                        parc.owned_in_scope(bound, |parc| parc_expr(parc, rest))?;
                    let def = parc_def(parc, false, def)?;
                    Ok(Expr::make_let(vec![DefGroup::NonRec(def)], rest))
                }
                DefGroup::Rec(_) => Err(parc.error(ParcErrorKind::RecursiveLet)),
            }
        }
        Expr::Case { scruts, branches } => {
            if is_normalized(&scruts, &branches) {
                parc_case(parc, scruts, branches)
            } else {
                let normalized = normalize_case(parc.uniq(), scruts, branches);
                parc_expr(parc, normalized)
            }
        }
    }
}

/// Value lambda: analyze the body in isolation, then retain every capture
/// in the enclosing scope.
fn parc_lam(
    parc: &mut Parc<'_>,
    params: Vec<TName>,
    body: Expr,
) -> Result<Expr, ParcError> {
    let param_set: Live = params.iter().cloned().collect();
    let caps: Live = free_locals(&body)
        .into_iter()
        .filter(|c| !param_set.contains(c))
        .collect();

    let (body, live_in_lam) = parc.isolate_with(Live::default(), |parc| {
        parc.with_owned(caps.clone(), |parc| {
            parc.owned_in_scope(param_set.clone(), |parc| parc_expr(parc, body))
        })
    })?;

    // The liveness observed inside the body must agree with the
    // free-variable computation, or the analysis is inconsistent.
    if live_in_lam != caps {
        return Err(parc.error(ParcErrorKind::CaptureMismatch {
            captures: sorted_vec(&caps),
            live: sorted_vec(&live_in_lam),
        }));
    }

    // Each construction of the closure takes one reference per capture.
    // The enclosing scope keeps its own reference for later uses or for
    // its binder to release.
    let mut dups = Vec::new();
    for cap in sorted_vec(&caps) {
        if let Some(dup) = parc.gen_dup(&cap)? {
            dups.push(dup);
        }
    }

    Ok(Expr::maybe_stats(dups, Expr::lam(params, body)))
}

/// A branch analyzed but not yet finalized: finalization needs the merged
/// live set of the whole match. Holds only the transformed guards and
/// their per-guard analysis results — never the live cell itself.
struct PendingBranch {
    patterns: Vec<Pattern>,
    pvs: Live,
    guards: Vec<PendingGuard>,
}

struct PendingGuard {
    test: Expr,
    body: Expr,
    /// Guard-entry dups for pattern variables the body consumed.
    dups: Vec<Expr>,
    /// Names the body needs (seeded with the liveness at the match).
    live_body: Live,
    /// Owned set in effect while the guard was analyzed.
    owned: Live,
}

impl PendingBranch {
    fn finish(self, parc: &Parc<'_>, match_live: &Live) -> Result<Branch, ParcError> {
        let mut guards = Vec::with_capacity(self.guards.len());
        for guard in self.guards {
            guards.push(guard.finish(parc, &self.pvs, match_live)?);
        }
        Ok(Branch {
            patterns: self.patterns,
            guards,
        })
    }
}

impl PendingGuard {
    fn finish(
        self,
        parc: &Parc<'_>,
        pvs: &Live,
        match_live: &Live,
    ) -> Result<Guard, ParcError> {
        let mut stats = self.dups;

        // Pattern variables this guard leaves dead.
        let mut dead: Vec<&TName> = pvs.difference(&self.live_body).collect();
        dead.sort();
        for name in dead {
            if let Some(drop) = parc.gen_drop(name)? {
                stats.push(drop);
            }
        }

        // Owned names the match keeps alive for other paths but this guard
        // does not consume (the scrutinees among them).
        let mut stale: Vec<&TName> = match_live
            .difference(&self.live_body)
            .filter(|name| self.owned.contains(*name))
            .collect();
        stale.sort();
        for name in stale {
            if let Some(drop) = parc.gen_drop(name)? {
                stats.push(drop);
            }
        }

        Ok(Guard {
            test: self.test,
            body: Expr::maybe_stats(stats, self.body),
        })
    }
}

/// Normalized `case`: analyze every branch against the liveness at the
/// match, mark the scrutinees live, then finalize each branch against the
/// merged live set.
fn parc_case(
    parc: &mut Parc<'_>,
    scruts: Vec<Expr>,
    branches: Vec<Branch>,
) -> Result<Expr, ParcError> {
    let live_at_match = parc.live_snapshot();

    let pending = reverse_map(parc, branches, |parc, branch| {
        parc_branch(parc, &live_at_match, branch)
    })?;

    // Scrutinees survive up to the match on every path.
    for scrut in &scruts {
        if let Expr::Var { name, .. } = scrut {
            parc.mark_live(name);
        }
    }

    let match_live = parc.live_snapshot();
    let mut finished = Vec::with_capacity(pending.len());
    for branch in pending {
        finished.push(branch.finish(parc, &match_live)?);
    }

    Ok(Expr::Case {
        scruts,
        branches: finished,
    })
}

fn parc_branch(
    parc: &mut Parc<'_>,
    live_at_match: &Live,
    branch: Branch,
) -> Result<PendingBranch, ParcError> {
    let pvs = branch.bound();
    let guards = reverse_map(parc, branch.guards, |parc, guard| {
        parc_guard(parc, &pvs, live_at_match, guard)
    })?;
    // Pattern variables do not leak past the branch.
    parc.forget(&pvs);
    Ok(PendingBranch {
        patterns: branch.patterns,
        pvs,
        guards,
    })
}

fn parc_guard(
    parc: &mut Parc<'_>,
    pvs: &Live,
    live_at_match: &Live,
    guard: Guard,
) -> Result<PendingGuard, ParcError> {
    parc.extend_owned(pvs.clone(), |parc| {
        let (body, live_body) =
            parc.isolate_with(live_at_match.clone(), |parc| parc_expr(parc, guard.body))?;

        // A pattern variable the body consumed still backs a field of the
        // matched cell; the match head needs its own reference to it.
        let mut dup_names: Vec<&TName> = pvs.intersection(&live_body).collect();
        dup_names.sort();
        let mut dups = Vec::new();
        for name in dup_names {
            if let Some(dup) = parc.gen_dup(name)? {
                dups.push(dup);
            }
        }

        // The outer analysis sees the union of all guard requirements.
        parc.mark_lives(live_body.iter());

        // The test cannot consume pattern variables, only borrow them.
        let test = parc.with_owned(Live::default(), |parc| parc_expr(parc, guard.test))?;

        Ok(PendingGuard {
            test,
            body,
            dups,
            live_body,
            owned: parc.owned_snapshot(),
        })
    })
}

/// Transform one definition. Top-level definitions run isolated so their
/// liveness cannot bleed into a neighbor's analysis.
pub(crate) fn parc_def(
    parc: &mut Parc<'_>,
    top: bool,
    def: Def,
) -> Result<Def, ParcError> {
    let Def { name, ty, body } = def;
    parc.push_current_def(name.clone());
    let result = if top {
        parc.isolated_(|parc| parc_expr(parc, body))
    } else {
        parc_expr(parc, body)
    };
    parc.pop_current_def();
    let body = result?;
    tracing::trace!(def = %name, body = %body, "parc rewrote definition");
    Ok(Def { name, ty, body })
}

fn sorted_vec(set: &FxHashSet<TName>) -> Vec<TName> {
    let mut names: Vec<TName> = set.iter().cloned().collect();
    names.sort();
    names
}
