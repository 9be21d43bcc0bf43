//! Weighted partitioning of one node's region among its children.
//!
//! Every region needs `p` distinct primary owners, so the partitioner hands
//! out `p * R` replica units, where `R` is the size of the region. Each
//! member's quota is proportional to its weight and capped at `R`. The units
//! are laid out as `p` layers over the region. Layer `j` supplies the `j`-th
//! primary owner of each position.
//!
//! ```text
//!   unrolled line (p = 2):  | A A A A | B B B B | C C C C | D D D D |
//!   layer 0:                | A A A A | B B B B |
//!   layer 1:                | C C C C | D D D D |
//!   entries:                [A,C]      [B,D]
//! ```
//!
//! Wrapping the line into layers never puts a member twice on the same
//! position because no quota exceeds `R`.
//!
//! An attempt is rejected when rounding or capping pushes any member's
//! share further from its weighted target than the magnitude tolerance. The
//! caller retries with a coarser tolerance, see [`partition`].

use crate::config::RingBuildConfig;
use crate::error::{Error, Result};
use crate::partitioning::region::RingRegion;
use crate::partitioning::ring::{RingEntry, TopologyRing};
use crate::types::NodeId;
use std::cmp::Ordering;
use std::collections::BTreeSet;
use thiserror::Error;

/// A child taking part in a partitioning, with its weight.
#[derive(Debug, Clone, PartialEq)]
pub struct PartitionMember {
    pub id: NodeId,
    pub weight: f64,
}

impl PartitionMember {
    pub fn new(id: impl Into<NodeId>, weight: f64) -> Self {
        Self {
            id: id.into(),
            weight,
        }
    }
}

/// Everything needed to partition one node's region.
#[derive(Debug, Clone)]
pub struct PartitionInput {
    /// Node whose children are being placed.
    pub node_id: NodeId,
    pub storage_policy_name: String,
    pub region: RingRegion,
    /// Eligible children in topology order.
    pub members: Vec<PartitionMember>,
    pub primary_replicas: u32,
    pub secondary_replicas: u32,
}

/// Why a single partitioning attempt failed.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PartitionError {
    /// Achievable allocation is too far from the weighted target. Retryable.
    #[error("member {member} deviates from its weighted share by {deviation:e} (tolerance {tolerance:e})")]
    ToleranceExceeded {
        member: NodeId,
        deviation: f64,
        tolerance: f64,
    },

    /// No tolerance can fix this input.
    #[error("{0}")]
    Structural(String),
}

impl PartitionError {
    /// Whether a coarser tolerance may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PartitionError::ToleranceExceeded { .. })
    }
}

/// Effective replica counts for a partitioning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ReplicaPlan {
    primary: usize,
    secondary: usize,
    /// Secondaries never repeat a primary of the same region.
    disjoint: bool,
}

fn plan_replicas(input: &PartitionInput) -> std::result::Result<ReplicaPlan, PartitionError> {
    let n = input.members.len();
    if n == 0 {
        return Err(PartitionError::Structural(format!(
            "node {} has no eligible members",
            input.node_id
        )));
    }
    if input.primary_replicas == 0 {
        return Err(PartitionError::Structural(format!(
            "policy {} requires zero primary replicas",
            input.storage_policy_name
        )));
    }
    if let Some(bad) = input
        .members
        .iter()
        .find(|m| !(m.weight.is_finite() && m.weight > 0.0))
    {
        return Err(PartitionError::Structural(format!(
            "member {} has non-positive weight {}",
            bad.id, bad.weight
        )));
    }

    let primary = (input.primary_replicas as usize).min(n);
    let requested_secondary = input.secondary_replicas as usize;
    let (secondary, disjoint) = if n > primary {
        (requested_secondary.min(n - primary), true)
    } else {
        (requested_secondary.min(n), false)
    };

    if primary < input.primary_replicas as usize || secondary < requested_secondary {
        tracing::warn!(
            node_id = %input.node_id,
            members = n,
            primary,
            secondary,
            requested_primary = input.primary_replicas,
            requested_secondary,
            "Not enough members for requested replicas"
        );
    }

    Ok(ReplicaPlan {
        primary,
        secondary,
        disjoint,
    })
}

/// Split `total` units among members by weight, no member above `cap`.
///
/// Members whose proportional share exceeds `cap` are pinned at `cap` and the
/// excess is shared among the rest. Rounding uses largest remainder.
pub(crate) fn compute_quotas(
    weights: &[f64],
    total: u128,
    cap: u128,
) -> std::result::Result<Vec<u128>, PartitionError> {
    let n = weights.len();
    if total > cap * n as u128 {
        return Err(PartitionError::Structural(format!(
            "{} units cannot be placed on {} members of capacity {}",
            total, n, cap
        )));
    }

    let mut capped = vec![false; n];
    let ideals = loop {
        let fixed = capped.iter().filter(|c| **c).count() as u128 * cap;
        let remaining = total.saturating_sub(fixed) as f64;
        let free_weight: f64 = (0..n).filter(|&i| !capped[i]).map(|i| weights[i]).sum();
        let ideals: Vec<f64> = (0..n)
            .map(|i| {
                if capped[i] {
                    cap as f64
                } else {
                    remaining * weights[i] / free_weight
                }
            })
            .collect();
        let over: Vec<usize> = (0..n)
            .filter(|&i| !capped[i] && ideals[i] > cap as f64)
            .collect();
        if over.is_empty() {
            break ideals;
        }
        for i in over {
            capped[i] = true;
        }
    };

    let mut quotas: Vec<u128> = (0..n)
        .map(|i| {
            if capped[i] {
                cap
            } else {
                (ideals[i].floor() as u128).min(cap)
            }
        })
        .collect();

    // Largest fractional part first; ties go to the earlier member.
    let mut order: Vec<usize> = (0..n).filter(|&i| !capped[i]).collect();
    order.sort_by(|&a, &b| {
        let fa = ideals[a] - ideals[a].floor();
        let fb = ideals[b] - ideals[b].floor();
        fb.partial_cmp(&fa).unwrap_or(Ordering::Equal).then(a.cmp(&b))
    });

    let assigned: u128 = quotas.iter().sum();
    if assigned < total {
        let mut deficit = total - assigned;
        while deficit > 0 {
            let mut progressed = false;
            for &i in &order {
                if deficit == 0 {
                    break;
                }
                if quotas[i] < cap {
                    quotas[i] += 1;
                    deficit -= 1;
                    progressed = true;
                }
            }
            if !progressed {
                return Err(PartitionError::Structural(format!(
                    "{} replica units left unplaced",
                    deficit
                )));
            }
        }
    } else if assigned > total {
        // Float rounding over-assigned; take back from the smallest remainders.
        let mut surplus = assigned - total;
        while surplus > 0 {
            let mut progressed = false;
            for &i in order.iter().rev() {
                if surplus == 0 {
                    break;
                }
                if quotas[i] > 0 {
                    quotas[i] -= 1;
                    surplus -= 1;
                    progressed = true;
                }
            }
            if !progressed {
                return Err(PartitionError::Structural(format!(
                    "{} replica units over-assigned",
                    surplus
                )));
            }
        }
    }

    Ok(quotas)
}

fn check_tolerance(
    input: &PartitionInput,
    quotas: &[u128],
    total: u128,
    tolerance: f64,
) -> std::result::Result<(), PartitionError> {
    let total_weight: f64 = input.members.iter().map(|m| m.weight).sum();
    let worst = input
        .members
        .iter()
        .zip(quotas)
        .map(|(member, &quota)| {
            let achieved = quota as f64 / total as f64;
            let target = member.weight / total_weight;
            (member, (achieved - target).abs())
        })
        .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal));

    match worst {
        Some((member, deviation)) if deviation > tolerance => Err(PartitionError::ToleranceExceeded {
            member: member.id.clone(),
            deviation,
            tolerance,
        }),
        _ => Ok(()),
    }
}

/// A run of offsets `[start, start + len)` in one layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Span {
    start: u128,
    len: u128,
    /// Member index; `None` is unowned.
    owner: Option<usize>,
}

impl Span {
    fn end(&self) -> u128 {
        self.start + self.len
    }
}

type Layer = Vec<Span>;

fn push_span(layer: &mut Layer, span: Span) {
    if span.len == 0 {
        return;
    }
    if let Some(last) = layer.last_mut() {
        if last.owner == span.owner && last.end() == span.start {
            last.len += span.len;
            return;
        }
    }
    layer.push(span);
}

fn normalize(spans: Vec<Span>) -> Layer {
    let mut layer = Vec::with_capacity(spans.len());
    for span in spans {
        push_span(&mut layer, span);
    }
    layer
}

fn fresh_layers(quotas: &[u128], replicas: usize, size: u128) -> Vec<Layer> {
    let mut layers: Vec<Layer> = vec![Vec::new(); replicas];
    let mut cursor: u128 = 0;
    for (member, &quota) in quotas.iter().enumerate() {
        let mut remaining = quota;
        while remaining > 0 {
            let layer = (cursor / size) as usize;
            let offset = cursor % size;
            let take = remaining.min(size - offset);
            push_span(
                &mut layers[layer],
                Span {
                    start: offset,
                    len: take,
                    owner: Some(member),
                },
            );
            cursor += take;
            remaining -= take;
        }
    }
    layers
}

fn prior_layers(input: &PartitionInput, prior: &TopologyRing, replicas: usize) -> Option<Vec<Layer>> {
    if prior.region() != input.region || prior.primary_replicas() != replicas {
        return None;
    }
    let mut layers: Vec<Layer> = vec![Vec::new(); replicas];
    for entry in prior.entries() {
        if entry.primary_owners.len() != replicas {
            return None;
        }
        let start = (entry.region.start() - input.region.start()) as u128;
        for (j, owner) in entry.primary_owners.iter().enumerate() {
            let member = input.members.iter().position(|m| &m.id == owner);
            push_span(
                &mut layers[j],
                Span {
                    start,
                    len: entry.region.size(),
                    owner: member,
                },
            );
        }
    }
    Some(layers)
}

fn holdings(layers: &[Layer], members: usize) -> Vec<u128> {
    let mut held = vec![0u128; members];
    for span in layers.iter().flatten() {
        if let Some(member) = span.owner {
            held[member] += span.len;
        }
    }
    held
}

/// Give up holdings above quota, trimming from the end of the ring.
fn release_surplus(layers: &mut [Layer], quotas: &[u128]) {
    let held = holdings(layers, quotas.len());
    for (member, &quota) in quotas.iter().enumerate() {
        let mut surplus = held[member].saturating_sub(quota);
        for layer in layers.iter_mut().rev() {
            let mut idx = layer.len();
            while idx > 0 && surplus > 0 {
                idx -= 1;
                if layer[idx].owner != Some(member) {
                    continue;
                }
                let cut = surplus.min(layer[idx].len);
                surplus -= cut;
                if cut == layer[idx].len {
                    layer[idx].owner = None;
                } else {
                    layer[idx].len -= cut;
                    let freed = Span {
                        start: layer[idx].end(),
                        len: cut,
                        owner: None,
                    };
                    layer.insert(idx + 1, freed);
                }
            }
            if surplus == 0 {
                break;
            }
        }
    }
}

/// Offsets held by `member` in any layer, merged into disjoint runs.
fn occupied_by(layers: &[Layer], member: usize) -> Vec<(u128, u128)> {
    let mut runs: Vec<(u128, u128)> = layers
        .iter()
        .flatten()
        .filter(|s| s.owner == Some(member))
        .map(|s| (s.start, s.end()))
        .collect();
    runs.sort_unstable();
    let mut merged: Vec<(u128, u128)> = Vec::with_capacity(runs.len());
    for (a, b) in runs {
        if let Some(last) = merged.last_mut() {
            if a <= last.1 {
                last.1 = last.1.max(b);
                continue;
            }
        }
        merged.push((a, b));
    }
    merged
}

/// Parts of `[start, end)` not covered by `occupied`.
fn gaps(start: u128, end: u128, occupied: &[(u128, u128)]) -> Vec<(u128, u128)> {
    let mut out = Vec::new();
    let mut cursor = start;
    for &(a, b) in occupied {
        if b <= cursor {
            continue;
        }
        if a >= end {
            break;
        }
        if a > cursor {
            out.push((cursor, a));
        }
        cursor = cursor.max(b);
        if cursor >= end {
            break;
        }
    }
    if cursor < end {
        out.push((cursor, end));
    }
    out
}

/// Hand unowned offsets to members below quota. Returns false if some
/// member cannot reach its quota without owning a position twice.
fn fill_deficits(layers: &mut [Layer], quotas: &[u128]) -> bool {
    let held = holdings(layers, quotas.len());
    for (member, &quota) in quotas.iter().enumerate() {
        let mut need = quota.saturating_sub(held[member]);
        for j in 0..layers.len() {
            if need == 0 {
                break;
            }
            let occupied = occupied_by(layers, member);
            let mut rebuilt = Vec::with_capacity(layers[j].len() + 2);
            for span in layers[j].drain(..) {
                if span.owner.is_some() || need == 0 {
                    rebuilt.push(span);
                    continue;
                }
                let mut cursor = span.start;
                for (a, b) in gaps(span.start, span.end(), &occupied) {
                    if need == 0 {
                        break;
                    }
                    let take = (b - a).min(need);
                    if a > cursor {
                        rebuilt.push(Span {
                            start: cursor,
                            len: a - cursor,
                            owner: None,
                        });
                    }
                    rebuilt.push(Span {
                        start: a,
                        len: take,
                        owner: Some(member),
                    });
                    need -= take;
                    cursor = a + take;
                }
                if cursor < span.end() {
                    rebuilt.push(Span {
                        start: cursor,
                        len: span.end() - cursor,
                        owner: None,
                    });
                }
            }
            layers[j] = normalize(rebuilt);
        }
        if need > 0 {
            return false;
        }
    }
    true
}

fn incremental_layers(
    input: &PartitionInput,
    prior: &TopologyRing,
    replicas: usize,
    quotas: &[u128],
) -> Option<Vec<Layer>> {
    let Some(mut layers) = prior_layers(input, prior, replicas) else {
        tracing::debug!(
            node_id = %input.node_id,
            "Prior ring does not match region or replica count, building fresh"
        );
        return None;
    };
    release_surplus(&mut layers, quotas);
    if !fill_deficits(&mut layers, quotas) {
        tracing::debug!(
            node_id = %input.node_id,
            "Prior ring cannot be adjusted without duplicate owners, building fresh"
        );
        return None;
    }
    Some(layers)
}

fn secondaries_for(primaries: &[usize], members: usize, plan: &ReplicaPlan) -> Vec<usize> {
    if plan.secondary == 0 {
        return Vec::new();
    }
    let after = primaries.last().map_or(0, |&last| last + 1);
    (0..members)
        .map(|k| (after + k) % members)
        .filter(|m| !plan.disjoint || !primaries.contains(m))
        .take(plan.secondary)
        .collect()
}

fn materialize(
    input: &PartitionInput,
    plan: &ReplicaPlan,
    layers: &[Layer],
    tolerance: f64,
) -> std::result::Result<TopologyRing, PartitionError> {
    let size = input.region.size();
    let starts: Vec<u128> = layers
        .iter()
        .flatten()
        .map(|s| s.start)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let id_of = |m: &usize| input.members[*m].id.clone();
    let mut cursors = vec![0usize; layers.len()];
    let mut entries = Vec::with_capacity(starts.len());
    for (k, &start) in starts.iter().enumerate() {
        let end = starts.get(k + 1).copied().unwrap_or(size);
        let mut primaries = Vec::with_capacity(layers.len());
        for (j, layer) in layers.iter().enumerate() {
            while cursors[j] < layer.len() && layer[cursors[j]].end() <= start {
                cursors[j] += 1;
            }
            let owner = layer
                .get(cursors[j])
                .filter(|s| s.start <= start)
                .and_then(|s| s.owner)
                .ok_or_else(|| {
                    PartitionError::Structural(format!(
                        "offset {} of node {} has no owner in replica layer {}",
                        start, input.node_id, j
                    ))
                })?;
            primaries.push(owner);
        }
        let secondaries = secondaries_for(&primaries, input.members.len(), plan);
        entries.push(RingEntry::new(
            input.region.sub_region(start, end),
            primaries.iter().map(id_of).collect(),
            secondaries.iter().map(id_of).collect(),
        ));
    }

    TopologyRing::new(
        input.node_id.clone(),
        input.storage_policy_name.clone(),
        input.region,
        plan.primary,
        plan.secondary,
        tolerance,
        entries,
    )
    .map_err(|e| PartitionError::Structural(e.to_string()))
}

/// One partitioning attempt at a fixed tolerance.
///
/// Pure: the same input, prior ring and tolerance always give the same ring.
pub fn try_partition(
    input: &PartitionInput,
    prior: Option<&TopologyRing>,
    tolerance: f64,
) -> std::result::Result<TopologyRing, PartitionError> {
    let plan = plan_replicas(input)?;
    let size = input.region.size();
    let total = size * plan.primary as u128;
    let weights: Vec<f64> = input.members.iter().map(|m| m.weight).collect();

    let quotas = compute_quotas(&weights, total, size)?;
    check_tolerance(input, &quotas, total, tolerance)?;

    let layers = prior
        .and_then(|p| incremental_layers(input, p, plan.primary, &quotas))
        .unwrap_or_else(|| fresh_layers(&quotas, plan.primary, size));

    materialize(input, &plan, &layers, tolerance)
}

/// Partition with tolerance escalation.
///
/// Tries each tolerance of [`RingBuildConfig::tolerance_schedule`] in turn.
/// Only tolerance failures are retried; anything else, or running past the
/// ceiling, is a [`Error::StructuralBuild`].
pub fn partition(
    input: &PartitionInput,
    prior: Option<&TopologyRing>,
    config: &RingBuildConfig,
) -> Result<TopologyRing> {
    let mut last_failure: Option<PartitionError> = None;

    for tolerance in config.tolerance_schedule() {
        tracing::debug!(node_id = %input.node_id, tolerance, "Partitioning node");
        match try_partition(input, prior, tolerance) {
            Ok(ring) => {
                tracing::info!(
                    node_id = %input.node_id,
                    policy = %input.storage_policy_name,
                    members = input.members.len(),
                    regions = ring.entries().len(),
                    tolerance,
                    incremental = prior.is_some(),
                    "Built topology ring"
                );
                return Ok(ring);
            }
            Err(e) if e.is_retryable() => {
                tracing::warn!(
                    node_id = %input.node_id,
                    tolerance,
                    error = %e,
                    "Partition infeasible at tolerance, escalating"
                );
                last_failure = Some(e);
            }
            Err(e) => {
                return Err(Error::StructuralBuild {
                    node: input.node_id.clone(),
                    reason: e.to_string(),
                });
            }
        }
    }

    Err(Error::StructuralBuild {
        node: input.node_id.clone(),
        reason: format!(
            "no feasible partition up to tolerance {:e}: {}",
            config.max_magnitude_tolerance(),
            last_failure.map_or_else(|| "no tolerance attempted".to_string(), |e| e.to_string())
        ),
    })
}
