//! Reads solved variable values back into schedule entries and binds
//! special-room instances in a post-pass.

use crate::model::{Prep, Vars};
use good_lp::{variable, Expression, ProblemVariables, Solution as LpSolution, SolverModel};
use plan_core::{SchedError, SlotIndex};
use std::collections::BTreeMap;
use types::{DomainModel, ScheduleEntry, TeacherAssignment};

pub(crate) fn extract_entries(
    prep: &Prep<'_>,
    v: &Vars<'_>,
    sol: &impl LpSolution,
) -> (Vec<ScheduleEntry>, Vec<TeacherAssignment>) {
    let mut assignments: Vec<TeacherAssignment> = Vec::new();
    for ((tid, cid, sid), a) in &v.assign {
        if sol.value(*a) < 0.5 {
            continue;
        }
        let hours = v
            .slot
            .range((*tid, *cid, *sid, 0, 0)..=(*tid, *cid, *sid, u8::MAX, u8::MAX))
            .filter(|(_, x)| sol.value(**x) > 0.5)
            .count() as u32;
        assignments.push(TeacherAssignment {
            teacher: (*tid).into(),
            class: (*cid).into(),
            subject: (*sid).into(),
            hours_per_week: hours,
        });
    }

    let mut entries: Vec<ScheduleEntry> = Vec::new();
    for ((tid, cid, sid, day, period), x) in &v.slot {
        if sol.value(*x) > 0.5 {
            entries.push(ScheduleEntry {
                day: *day,
                period: *period,
                teacher: (*tid).into(),
                class: (*cid).into(),
                subject: (*sid).into(),
                room: None,
                coupling: None,
            });
        }
    }

    // Coupling slots fan out into one entry per group and involved class.
    for coupling in &prep.couplings {
        let kid = coupling.id.0.as_str();
        for ((k, day, period), u) in &v.couple_slot {
            if *k != kid || sol.value(*u) < 0.5 {
                continue;
            }
            for (g_idx, group) in coupling.groups.iter().enumerate() {
                let teacher = v
                    .group_assign
                    .iter()
                    .find(|((gk, gi, _), g)| {
                        *gk == kid && *gi == g_idx && sol.value(**g) > 0.5
                    })
                    .map(|((_, _, tid), _)| *tid);
                let Some(teacher) = teacher else {
                    tracing::warn!(
                        coupling = kid,
                        group = g_idx,
                        "no teacher selected for coupling group"
                    );
                    continue;
                };
                for class in &coupling.involved_classes {
                    entries.push(ScheduleEntry {
                        day: *day,
                        period: *period,
                        teacher: teacher.into(),
                        class: class.clone(),
                        subject: group.subject.clone(),
                        room: None,
                        coupling: Some(coupling.id.clone()),
                    });
                }
            }
        }
    }

    entries.sort_by(|a, b| {
        (a.day, a.period, &a.class.0, &a.subject.0).cmp(&(b.day, b.period, &b.class.0, &b.subject.0))
    });
    (entries, assignments)
}

/// One room booking: a contiguous block of periods that must hold a single
/// room instance (doubles keep their room across both halves).
struct RoomUnit {
    periods: Vec<u8>,
    entry_indices: Vec<usize>,
    /// stable tie-break: (class or coupling id, subject id)
    owner: String,
    subject: String,
}

/// Binds room instances to every lesson whose subject needs a special room.
///
/// Greedy first: per (day, room type), units sorted by (first period,
/// owner, subject) take the lowest-numbered instance free for all their
/// periods. Units the greedy pass cannot bind go to a small 0/1 assignment
/// model per cluster; if that also fails, room assignment as a whole fails.
pub(crate) fn assign_rooms(
    model: &DomainModel,
    _slots: &SlotIndex,
    entries: &mut [ScheduleEntry],
) -> Result<(), SchedError> {
    let room_of_subject: BTreeMap<&str, &str> = model
        .subjects
        .iter()
        .filter_map(|s| s.room_type.as_ref().map(|r| (s.id.0.as_str(), r.0.as_str())))
        .collect();
    let capacity: BTreeMap<&str, u32> = model
        .rooms
        .iter()
        .map(|r| (r.id.0.as_str(), r.capacity))
        .collect();

    // (day, room type, owner, subject) -> [(period, entry index)]
    let mut cells: BTreeMap<(u8, String, String, String), Vec<(u8, usize)>> = BTreeMap::new();
    for (i, e) in entries.iter().enumerate() {
        let Some(rtype) = room_of_subject.get(e.subject.0.as_str()) else {
            continue;
        };
        let owner = match &e.coupling {
            Some(k) => k.0.clone(),
            None => e.class.0.clone(),
        };
        cells
            .entry((e.day, rtype.to_string(), owner, e.subject.0.clone()))
            .or_default()
            .push((e.period, i));
    }

    // Split each owner's day into contiguous blocks.
    let mut clusters: BTreeMap<(u8, String), Vec<RoomUnit>> = BTreeMap::new();
    for ((day, rtype, owner, subject), mut slots) in cells {
        slots.sort_unstable();
        let mut current: Vec<(u8, usize)> = Vec::new();
        let mut flush = |block: &mut Vec<(u8, usize)>, out: &mut Vec<RoomUnit>| {
            if block.is_empty() {
                return;
            }
            let mut periods: Vec<u8> = block.iter().map(|(p, _)| *p).collect();
            periods.dedup();
            out.push(RoomUnit {
                periods,
                entry_indices: block.iter().map(|(_, i)| *i).collect(),
                owner: owner.clone(),
                subject: subject.clone(),
            });
            block.clear();
        };
        let cluster = clusters.entry((day, rtype)).or_default();
        for (p, i) in slots {
            if let Some((prev, _)) = current.last() {
                if p > prev + 1 {
                    flush(&mut current, cluster);
                }
            }
            current.push((p, i));
        }
        flush(&mut current, cluster);
    }

    for ((day, rtype), mut units) in clusters {
        let cap = capacity.get(rtype.as_str()).copied().unwrap_or(0) as usize;
        if cap == 0 {
            return Err(SchedError::RoomAssignment(format!(
                "room type {rtype} needed on day {} but has no rooms",
                day + 1
            )));
        }
        units.sort_by(|a, b| {
            (a.periods[0], &a.owner, &a.subject).cmp(&(b.periods[0], &b.owner, &b.subject))
        });

        let mut busy: Vec<Vec<u8>> = vec![Vec::new(); cap];
        let mut unbound: Vec<usize> = Vec::new();
        let mut bound: Vec<Option<usize>> = vec![None; units.len()];
        for (ui, unit) in units.iter().enumerate() {
            let free = (0..cap).find(|i| unit.periods.iter().all(|p| !busy[*i].contains(p)));
            match free {
                Some(instance) => {
                    busy[instance].extend(unit.periods.iter().copied());
                    bound[ui] = Some(instance);
                }
                None => unbound.push(ui),
            }
        }

        if !unbound.is_empty() {
            tracing::debug!(
                day,
                room_type = %rtype,
                unbound = unbound.len(),
                "greedy room pass failed, solving the cluster exactly"
            );
            bound = solve_room_cluster(&units, cap).ok_or_else(|| {
                SchedError::RoomAssignment(format!(
                    "no conflict-free room assignment for {rtype} on day {}",
                    day + 1
                ))
            })?;
        }

        for (ui, unit) in units.iter().enumerate() {
            let instance = bound[ui].ok_or_else(|| {
                SchedError::RoomAssignment(format!("unit without room instance for {rtype}"))
            })?;
            let label = format!("{}-{}", rtype, instance + 1);
            for &i in &unit.entry_indices {
                entries[i].room = Some(label.clone());
            }
        }
    }

    Ok(())
}

/// Exact fallback: one binary per (unit, instance), non-overlap per
/// (instance, period).
fn solve_room_cluster(units: &[RoomUnit], cap: usize) -> Option<Vec<Option<usize>>> {
    let mut pvars = ProblemVariables::new();
    let mut z: Vec<Vec<good_lp::Variable>> = Vec::with_capacity(units.len());
    for _ in units {
        z.push((0..cap).map(|_| pvars.add(variable().binary())).collect());
    }

    let mut m = pvars
        .minimise(Expression::from(0.0))
        .using(good_lp::default_solver);

    for row in &z {
        let mut pick = Expression::from(0.0);
        for var in row {
            pick += *var;
        }
        m = m.with(pick.eq(1.0));
    }

    let mut periods: Vec<u8> = units.iter().flat_map(|u| u.periods.iter().copied()).collect();
    periods.sort_unstable();
    periods.dedup();
    for instance in 0..cap {
        for &p in &periods {
            let mut load = Expression::from(0.0);
            for (ui, unit) in units.iter().enumerate() {
                if unit.periods.contains(&p) {
                    load += z[ui][instance];
                }
            }
            m = m.with(load.leq(1.0));
        }
    }

    let sol = m.solve().ok()?;
    let mut bound = vec![None; units.len()];
    for (ui, row) in z.iter().enumerate() {
        for (instance, var) in row.iter().enumerate() {
            if sol.value(*var) > 0.5 {
                bound[ui] = Some(instance);
                break;
            }
        }
    }
    Some(bound)
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::TimeGrid;

    fn entry(day: u8, period: u8, class: &str, subject: &str) -> ScheduleEntry {
        ScheduleEntry {
            day,
            period,
            teacher: "T1".into(),
            class: class.into(),
            subject: subject.into(),
            room: None,
            coupling: None,
        }
    }

    fn room_model(capacity: u32) -> DomainModel {
        DomainModel {
            time_grid: TimeGrid::default_gymnasium(),
            subjects: vec![types::Subject {
                id: "Ph".into(),
                name: "Physik".into(),
                short: "Ph".into(),
                category: types::SubjectCategory::Nw,
                room_type: Some("physik".into()),
                double_required: true,
                double_preferred: false,
                is_hauptfach: false,
            }],
            rooms: vec![types::RoomType {
                id: "physik".into(),
                display_name: "Physik-Raum".into(),
                capacity,
            }],
            classes: vec![],
            teachers: vec![],
            couplings: vec![],
            course_tracks: vec![],
            pins: vec![],
            weights: types::SoftWeights::zero(),
            limits: types::SolverLimits::default(),
        }
    }

    #[test]
    fn double_block_keeps_one_instance() {
        let model = room_model(2);
        let slots = SlotIndex::new(&model.time_grid);
        let mut entries = vec![
            entry(0, 3, "7a", "Ph"),
            entry(0, 4, "7a", "Ph"),
            entry(0, 3, "7b", "Ph"),
            entry(0, 4, "7b", "Ph"),
        ];
        assign_rooms(&model, &slots, &mut entries).unwrap();
        assert_eq!(entries[0].room, entries[1].room);
        assert_eq!(entries[2].room, entries[3].room);
        assert_ne!(entries[0].room, entries[2].room);
        // Stable order: 7a before 7b gets instance 1.
        assert_eq!(entries[0].room.as_deref(), Some("physik-1"));
    }

    #[test]
    fn over_capacity_fails() {
        let model = room_model(1);
        let slots = SlotIndex::new(&model.time_grid);
        let mut entries = vec![entry(0, 3, "7a", "Ph"), entry(0, 3, "7b", "Ph")];
        let err = assign_rooms(&model, &slots, &mut entries).unwrap_err();
        assert_eq!(err.kind(), "room_assignment");
    }

    #[test]
    fn lessons_without_special_room_stay_unbound() {
        let mut model = room_model(1);
        model.subjects.push(types::Subject {
            id: "Ma".into(),
            name: "Mathematik".into(),
            short: "Ma".into(),
            category: types::SubjectCategory::Hauptfach,
            room_type: None,
            double_required: false,
            double_preferred: true,
            is_hauptfach: true,
        });
        let slots = SlotIndex::new(&model.time_grid);
        let mut entries = vec![entry(0, 1, "7a", "Ma")];
        assign_rooms(&model, &slots, &mut entries).unwrap();
        assert_eq!(entries[0].room, None);
    }
}
