//! 0/1 encoding of the timetable problem.
//!
//! Two variable layers, as in the scheduling core this solver grew out of:
//! `assign[t,c,s]` decides who teaches what, `slot[t,c,s,d,p]` decides when.
//! Coupling slots, double blocks and room capacities get their own variable
//! families. Activity aggregates are linked by equality to their term sums,
//! which is sound because the no-overlap constraints cap those sums at one.
//!
//! Every loop iterates id-sorted collections so that variable creation and
//! constraint posting order are deterministic for a fixed input.

use good_lp::{variable, Expression, ProblemVariables, SolverModel, Variable};
use plan_core::audit::coupling_covered_subjects;
use plan_core::SlotIndex;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use types::{
    Coupling, CourseTrack, DomainModel, SchoolClass, SoftWeights, Subject, SubjectId, Teacher,
};

/// Which constraint families the builder posts; the relaxer and the
/// two-pass driver flip these.
#[derive(Clone, Debug)]
pub struct BuildOptions {
    pub use_soft: bool,
    /// Double-period counts for `double_required` subjects.
    pub enforce_doubles: bool,
    /// Special-room capacities.
    pub room_limits: bool,
    /// Couplings (dropped entirely when false).
    pub couplings: bool,
    /// Extra widening of the deputat band, in hours.
    pub deputat_slack: u32,
    /// Prefix compactness for Sek-I classes.
    pub compactness: bool,
    /// Pass 2 of the two-pass strategy: restrict to a fixed assignment.
    pub fix_assignments: Option<AssignmentPlan>,
    /// Incremental re-solve: placements forced to stay.
    pub fixed_entries: Vec<types::ScheduleEntry>,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            use_soft: true,
            enforce_doubles: true,
            room_limits: true,
            couplings: true,
            deputat_slack: 0,
            compactness: true,
            fix_assignments: None,
            fixed_entries: Vec::new(),
        }
    }
}

/// Outcome of the assignment pass: who teaches what, before placement.
#[derive(Clone, Debug, Default)]
pub struct AssignmentPlan {
    pub triples: BTreeSet<(String, String, String)>,
    /// (coupling id, group index) -> teacher id
    pub groups: BTreeMap<(String, usize), String>,
}

impl AssignmentPlan {
    fn allows(&self, teacher: &str, class: &str, subject: &str) -> bool {
        self.triples
            .contains(&(teacher.to_string(), class.to_string(), subject.to_string()))
    }

    fn group_teacher(&self, coupling: &str, group: usize) -> Option<&str> {
        self.groups
            .get(&(coupling.to_string(), group))
            .map(|s| s.as_str())
    }
}

/// Immutable lookup tables shared by variable creation and posting.
pub(crate) struct Prep<'a> {
    pub model: &'a DomainModel,
    pub slots: SlotIndex,
    pub teachers: Vec<&'a Teacher>,
    pub classes: Vec<&'a SchoolClass>,
    pub couplings: Vec<&'a Coupling>,
    pub tracks: Vec<&'a CourseTrack>,
    pub subject_by_id: BTreeMap<&'a str, &'a Subject>,
    pub teachers_by_subject: BTreeMap<&'a str, Vec<&'a Teacher>>,
    pub covered: BTreeMap<&'a str, HashSet<SubjectId>>,
    pub class_periods: BTreeMap<&'a str, Vec<u8>>,
    pub class_double_starts: BTreeMap<&'a str, Vec<u8>>,
    pub unavailable: HashMap<&'a str, BTreeSet<(u8, u8)>>,
    pub pin_by_class_slot: HashMap<(&'a str, u8, u8), (&'a str, &'a str)>,
    pub pin_by_teacher_slot: HashMap<(&'a str, u8, u8), (&'a str, &'a str)>,
    pub days: u8,
}

impl<'a> Prep<'a> {
    pub fn new(model: &'a DomainModel) -> Self {
        let slots = SlotIndex::new(&model.time_grid);

        let mut teachers: Vec<&Teacher> = model.teachers.iter().collect();
        teachers.sort_by(|a, b| a.id.cmp(&b.id));
        let mut classes: Vec<&SchoolClass> = model.classes.iter().collect();
        classes.sort_by(|a, b| a.id.cmp(&b.id));
        let mut couplings: Vec<&Coupling> = model.couplings.iter().collect();
        couplings.sort_by(|a, b| a.id.cmp(&b.id));
        let mut tracks: Vec<&CourseTrack> = model.course_tracks.iter().collect();
        tracks.sort_by(|a, b| a.id.cmp(&b.id));

        let subject_by_id: BTreeMap<&str, &Subject> = model
            .subjects
            .iter()
            .map(|s| (s.id.0.as_str(), s))
            .collect();

        let mut teachers_by_subject: BTreeMap<&str, Vec<&Teacher>> = BTreeMap::new();
        for teacher in &teachers {
            for subject in &teacher.subjects {
                teachers_by_subject
                    .entry(subject.0.as_str())
                    .or_default()
                    .push(teacher);
            }
        }

        let class_periods: BTreeMap<&str, Vec<u8>> = classes
            .iter()
            .map(|c| (c.id.0.as_str(), slots.class_periods(c)))
            .collect();
        let class_double_starts: BTreeMap<&str, Vec<u8>> = classes
            .iter()
            .map(|c| (c.id.0.as_str(), slots.class_double_starts(c)))
            .collect();

        let unavailable: HashMap<&str, BTreeSet<(u8, u8)>> = teachers
            .iter()
            .map(|t| {
                (
                    t.id.0.as_str(),
                    t.unavailable.iter().map(|s| (s.day, s.period)).collect(),
                )
            })
            .collect();

        let mut pin_by_class_slot = HashMap::new();
        let mut pin_by_teacher_slot = HashMap::new();
        for pin in &model.pins {
            pin_by_class_slot.insert(
                (pin.class.0.as_str(), pin.slot.day, pin.slot.period),
                (pin.teacher.0.as_str(), pin.subject.0.as_str()),
            );
            pin_by_teacher_slot.insert(
                (pin.teacher.0.as_str(), pin.slot.day, pin.slot.period),
                (pin.class.0.as_str(), pin.subject.0.as_str()),
            );
        }

        let covered = coupling_covered_subjects(model);
        let days = model.time_grid.days_per_week;

        Self {
            model,
            slots,
            teachers,
            classes,
            couplings,
            tracks,
            subject_by_id,
            teachers_by_subject,
            covered,
            class_periods,
            class_double_starts,
            unavailable,
            pin_by_class_slot,
            pin_by_teacher_slot,
            days,
        }
    }

    fn is_covered(&self, class: &str, subject: &SubjectId) -> bool {
        self.covered
            .get(class)
            .is_some_and(|set| set.contains(subject))
    }

    pub fn subject_hours(&self, class: &str, subject: &str) -> u32 {
        self.classes
            .iter()
            .find(|c| c.id.0 == class)
            .and_then(|c| c.curriculum.get(&SubjectId::from(subject)))
            .copied()
            .unwrap_or(0)
    }
}

type Triple<'a> = (&'a str, &'a str, &'a str);
type SlotKey<'a> = (&'a str, &'a str, &'a str, u8, u8);

/// All decision variables plus the iteration indexes over them.
pub(crate) struct Vars<'a> {
    pub assign: BTreeMap<Triple<'a>, Variable>,
    pub slot: BTreeMap<SlotKey<'a>, Variable>,
    pub double: BTreeMap<SlotKey<'a>, Variable>,
    /// (coupling, day, period)
    pub couple_slot: BTreeMap<(&'a str, u8, u8), Variable>,
    /// (coupling, group index, teacher)
    pub group_assign: BTreeMap<(&'a str, usize, &'a str), Variable>,
    /// teacher occupied by a coupling group at a slot: u AND g
    pub group_busy: BTreeMap<(&'a str, usize, &'a str, u8, u8), Variable>,
    pub act_class: BTreeMap<(&'a str, u8, u8), Variable>,
    pub act_teacher: BTreeMap<(&'a str, u8, u8), Variable>,
    /// odd-hours singleton day marker per (class, subject, day)
    pub single_day: BTreeMap<(&'a str, &'a str, u8), Variable>,

    // Iteration indexes, filled during creation (the fast paths the
    // posting loops run on).
    pub sidx_cs: BTreeMap<(&'a str, &'a str), Vec<Variable>>,
    pub sidx_t: BTreeMap<&'a str, Vec<Variable>>,
    pub sidx_tdp: BTreeMap<(&'a str, u8, u8), Vec<Variable>>,
    pub sidx_cdp: BTreeMap<(&'a str, u8, u8), Vec<Variable>>,
    pub sidx_csd: BTreeMap<(&'a str, &'a str, u8), Vec<Variable>>,
    pub yidx_cs: BTreeMap<(&'a str, &'a str), Vec<Variable>>,
    pub yidx_csd: BTreeMap<(&'a str, &'a str, u8), Vec<Variable>>,
    pub uidx_k: BTreeMap<&'a str, Vec<Variable>>,
    pub uidx_cdp: BTreeMap<(&'a str, u8, u8), Vec<Variable>>,
    pub busy_tdp: BTreeMap<(&'a str, u8, u8), Vec<Variable>>,
    /// teacher -> (group var, weekly hours) for the deputat sum
    pub gidx_t: BTreeMap<&'a str, Vec<(Variable, f64)>>,
    /// (room type, day, period) -> occupying variables
    pub ridx: BTreeMap<(&'a str, u8, u8), Vec<Variable>>,
}

impl<'a> Vars<'a> {
    pub fn count(&self) -> usize {
        self.assign.len()
            + self.slot.len()
            + self.double.len()
            + self.couple_slot.len()
            + self.group_assign.len()
            + self.group_busy.len()
            + self.act_class.len()
            + self.act_teacher.len()
            + self.single_day.len()
    }
}

pub(crate) fn declare_variables<'a>(
    prep: &Prep<'a>,
    opts: &BuildOptions,
    pvars: &mut ProblemVariables,
) -> Vars<'a> {
    let mut v = Vars {
        assign: BTreeMap::new(),
        slot: BTreeMap::new(),
        double: BTreeMap::new(),
        couple_slot: BTreeMap::new(),
        group_assign: BTreeMap::new(),
        group_busy: BTreeMap::new(),
        act_class: BTreeMap::new(),
        act_teacher: BTreeMap::new(),
        single_day: BTreeMap::new(),
        sidx_cs: BTreeMap::new(),
        sidx_t: BTreeMap::new(),
        sidx_tdp: BTreeMap::new(),
        sidx_cdp: BTreeMap::new(),
        sidx_csd: BTreeMap::new(),
        yidx_cs: BTreeMap::new(),
        yidx_csd: BTreeMap::new(),
        uidx_k: BTreeMap::new(),
        uidx_cdp: BTreeMap::new(),
        busy_tdp: BTreeMap::new(),
        gidx_t: BTreeMap::new(),
        ridx: BTreeMap::new(),
    };

    declare_assign_and_slot(prep, opts, pvars, &mut v);
    if opts.couplings {
        declare_couplings(prep, opts, pvars, &mut v);
    }
    declare_doubles(prep, opts, pvars, &mut v);
    declare_activity(prep, pvars, &mut v);

    v
}

fn declare_assign_and_slot<'a>(
    prep: &Prep<'a>,
    opts: &BuildOptions,
    pvars: &mut ProblemVariables,
    v: &mut Vars<'a>,
) {
    for class in &prep.classes {
        let cid = class.id.0.as_str();
        let periods = &prep.class_periods[cid];
        for (subject_id, hours) in &class.curriculum {
            if *hours == 0 || prep.is_covered(cid, subject_id) {
                continue;
            }
            let sid = subject_id.0.as_str();
            let Some(subject) = prep.subject_by_id.get(sid) else {
                continue;
            };
            let room = subject.room_type.as_ref().map(|r| r.0.as_str());
            let qualified = prep.teachers_by_subject.get(sid).cloned().unwrap_or_default();
            for teacher in qualified {
                if class.is_course && !teacher.can_teach_sek2 {
                    continue;
                }
                let tid = teacher.id.0.as_str();
                if let Some(plan) = &opts.fix_assignments {
                    if !plan.allows(tid, cid, sid) {
                        continue;
                    }
                }
                v.assign.insert((tid, cid, sid), pvars.add(variable().binary()));

                let blocked = &prep.unavailable[tid];
                for day in 0..prep.days {
                    for &p in periods {
                        if blocked.contains(&(day, p)) {
                            continue;
                        }
                        // A pin at this cell for someone else rules the
                        // variable out up front.
                        if let Some(&(pt, ps)) = prep.pin_by_class_slot.get(&(cid, day, p)) {
                            if pt != tid || ps != sid {
                                continue;
                            }
                        }
                        if let Some(&(pc, ps)) = prep.pin_by_teacher_slot.get(&(tid, day, p)) {
                            if pc != cid || ps != sid {
                                continue;
                            }
                        }
                        let var = pvars.add(variable().binary());
                        v.slot.insert((tid, cid, sid, day, p), var);
                        v.sidx_cs.entry((cid, sid)).or_default().push(var);
                        v.sidx_t.entry(tid).or_default().push(var);
                        v.sidx_tdp.entry((tid, day, p)).or_default().push(var);
                        v.sidx_cdp.entry((cid, day, p)).or_default().push(var);
                        v.sidx_csd.entry((cid, sid, day)).or_default().push(var);
                        if let Some(room) = room {
                            v.ridx.entry((room, day, p)).or_default().push(var);
                        }
                    }
                }
            }
        }
    }
}

fn declare_couplings<'a>(
    prep: &Prep<'a>,
    opts: &BuildOptions,
    pvars: &mut ProblemVariables,
    v: &mut Vars<'a>,
) {
    for coupling in &prep.couplings {
        let kid = coupling.id.0.as_str();
        let any_course = coupling
            .involved_classes
            .iter()
            .any(|c| prep.model.class(c).is_some_and(|c| c.is_course));

        // The coupling may only sit where every involved class can.
        let mut common: Vec<u8> = coupling
            .involved_classes
            .first()
            .and_then(|c| prep.class_periods.get(c.0.as_str()).cloned())
            .unwrap_or_default();
        for class in &coupling.involved_classes[1..] {
            if let Some(periods) = prep.class_periods.get(class.0.as_str()) {
                common.retain(|p| periods.contains(p));
            }
        }

        for day in 0..prep.days {
            for &p in &common {
                let var = pvars.add(variable().binary());
                v.couple_slot.insert((kid, day, p), var);
                v.uidx_k.entry(kid).or_default().push(var);
                for class in &coupling.involved_classes {
                    v.uidx_cdp
                        .entry((class.0.as_str(), day, p))
                        .or_default()
                        .push(var);
                }
            }
        }

        for (g_idx, group) in coupling.groups.iter().enumerate() {
            let sid = group.subject.0.as_str();
            if let Some(subject) = prep.subject_by_id.get(sid) {
                if let Some(room) = &subject.room_type {
                    // One room per group, held at every coupling slot.
                    for day in 0..prep.days {
                        for &p in &common {
                            if let Some(&u) = v.couple_slot.get(&(kid, day, p)) {
                                v.ridx
                                    .entry((room.0.as_str(), day, p))
                                    .or_default()
                                    .push(u);
                            }
                        }
                    }
                }
            }
            let qualified = prep.teachers_by_subject.get(sid).cloned().unwrap_or_default();
            for teacher in qualified {
                if any_course && !teacher.can_teach_sek2 {
                    continue;
                }
                let tid = teacher.id.0.as_str();
                if let Some(plan) = &opts.fix_assignments {
                    if plan.group_teacher(kid, g_idx) != Some(tid) {
                        continue;
                    }
                }
                let g = pvars.add(variable().binary());
                v.group_assign.insert((kid, g_idx, tid), g);
                v.gidx_t
                    .entry(tid)
                    .or_default()
                    .push((g, group.hours_per_week as f64));

                for day in 0..prep.days {
                    for &p in &common {
                        let b = pvars.add(variable().binary());
                        v.group_busy.insert((kid, g_idx, tid, day, p), b);
                        v.busy_tdp.entry((tid, day, p)).or_default().push(b);
                    }
                }
            }
        }
    }
}

fn declare_doubles<'a>(
    prep: &Prep<'a>,
    opts: &BuildOptions,
    pvars: &mut ProblemVariables,
    v: &mut Vars<'a>,
) {
    let triples: Vec<Triple<'a>> = v.assign.keys().copied().collect();
    for (tid, cid, sid) in triples {
        let Some(subject) = prep.subject_by_id.get(sid) else {
            continue;
        };
        if !(subject.double_required || subject.double_preferred) {
            continue;
        }
        for day in 0..prep.days {
            for &bs in &prep.class_double_starts[cid] {
                let first = v.slot.get(&(tid, cid, sid, day, bs));
                let second = v.slot.get(&(tid, cid, sid, day, bs + 1));
                if first.is_some() && second.is_some() {
                    let y = pvars.add(variable().binary());
                    v.double.insert((tid, cid, sid, day, bs), y);
                    v.yidx_cs.entry((cid, sid)).or_default().push(y);
                    v.yidx_csd.entry((cid, sid, day)).or_default().push(y);
                }
            }
        }
    }

    // Day markers for the odd-hours singleton of double_required subjects.
    if opts.enforce_doubles {
        for class in &prep.classes {
            let cid = class.id.0.as_str();
            for (subject_id, &hours) in &class.curriculum {
                let sid = subject_id.0.as_str();
                if hours < 3 || hours % 2 == 0 || prep.is_covered(cid, subject_id) {
                    continue;
                }
                let required = prep
                    .subject_by_id
                    .get(sid)
                    .is_some_and(|s| s.double_required);
                if !required || !v.yidx_cs.contains_key(&(cid, sid)) {
                    continue;
                }
                for day in 0..prep.days {
                    v.single_day
                        .insert((cid, sid, day), pvars.add(variable().binary()));
                }
            }
        }
    }
}

fn declare_activity<'a>(prep: &Prep<'a>, pvars: &mut ProblemVariables, v: &mut Vars<'a>) {
    for class in &prep.classes {
        let cid = class.id.0.as_str();
        for day in 0..prep.days {
            for &p in &prep.class_periods[cid] {
                v.act_class.insert((cid, day, p), pvars.add(variable().binary()));
            }
        }
    }

    let mut teacher_cells: BTreeSet<(&str, u8, u8)> = BTreeSet::new();
    teacher_cells.extend(v.sidx_tdp.keys().copied());
    teacher_cells.extend(v.busy_tdp.keys().copied());
    for cell in teacher_cells {
        v.act_teacher.insert(cell, pvars.add(variable().binary()));
    }
}

/// Auxiliary variables of the soft objective and of the hard gap caps.
pub(crate) struct SoftVars<'a> {
    /// (teacher, day, period): the period is free between two lessons.
    pub is_gap: BTreeMap<(&'a str, u8, u8), Variable>,
    pub gap_before: BTreeMap<(&'a str, u8, u8), Variable>,
    pub gap_after: BTreeMap<(&'a str, u8, u8), Variable>,
    /// (teacher, day): gap units beyond the first (integer).
    pub gap_excess: BTreeMap<(&'a str, u8), Variable>,
    pub day_hours_max: BTreeMap<&'a str, Variable>,
    pub day_hours_min: BTreeMap<&'a str, Variable>,
    pub deputat_dev: BTreeMap<&'a str, Variable>,
    /// (teacher, preferred-free day): any lesson on that day.
    pub worked_on: BTreeMap<(&'a str, u8), Variable>,
    /// (class, subject, day): hauptfach hours beyond one, doubles excepted.
    pub spread_excess: BTreeMap<(&'a str, &'a str, u8), Variable>,
}

impl SoftVars<'_> {
    pub fn count(&self) -> usize {
        self.is_gap.len()
            + self.gap_before.len()
            + self.gap_after.len()
            + self.gap_excess.len()
            + self.day_hours_max.len()
            + self.day_hours_min.len()
            + self.deputat_dev.len()
            + self.worked_on.len()
            + self.spread_excess.len()
    }
}

/// Periods of one teacher-day that carry an activity variable, ascending.
fn teacher_day_periods<'a>(v: &Vars<'a>, tid: &'a str, day: u8) -> Vec<u8> {
    v.act_teacher
        .range((tid, day, 0)..=(tid, day, u8::MAX))
        .map(|((_, _, p), _)| *p)
        .collect()
}

pub(crate) fn declare_soft<'a>(
    prep: &Prep<'a>,
    opts: &BuildOptions,
    weights: &SoftWeights,
    v: &Vars<'a>,
    pvars: &mut ProblemVariables,
) -> SoftVars<'a> {
    let mut s = SoftVars {
        is_gap: BTreeMap::new(),
        gap_before: BTreeMap::new(),
        gap_after: BTreeMap::new(),
        gap_excess: BTreeMap::new(),
        day_hours_max: BTreeMap::new(),
        day_hours_min: BTreeMap::new(),
        deputat_dev: BTreeMap::new(),
        worked_on: BTreeMap::new(),
        spread_excess: BTreeMap::new(),
    };
    let soft = opts.use_soft;
    let max_day_hours = prep.slots.periods().len() as f64;

    for teacher in &prep.teachers {
        let tid = teacher.id.0.as_str();
        // The per-day gap cap is a hard constraint, so the indicator
        // variables exist whenever the teacher-day can have an interior
        // free period.
        for day in 0..prep.days {
            let periods = teacher_day_periods(v, tid, day);
            if periods.len() < 3 {
                continue;
            }
            for &p in &periods[1..periods.len() - 1] {
                s.gap_before.insert((tid, day, p), pvars.add(variable().binary()));
                s.gap_after.insert((tid, day, p), pvars.add(variable().binary()));
                s.is_gap.insert((tid, day, p), pvars.add(variable().binary()));
            }
            if soft && weights.gaps > 0 {
                s.gap_excess.insert(
                    (tid, day),
                    pvars.add(variable().integer().min(0.0).max(max_day_hours)),
                );
            }
        }

        if soft && weights.workload > 0 {
            s.day_hours_max
                .insert(tid, pvars.add(variable().integer().min(0.0).max(max_day_hours)));
            s.day_hours_min
                .insert(tid, pvars.add(variable().integer().min(0.0).max(max_day_hours)));
        }
        if soft && weights.deputat_dev > 0 {
            s.deputat_dev
                .insert(tid, pvars.add(variable().integer().min(0.0).max(80.0)));
        }
        if soft && weights.day_wishes > 0 {
            for &day in &teacher.preferred_free_days {
                if day < prep.days {
                    s.worked_on.insert((tid, day), pvars.add(variable().binary()));
                }
            }
        }
    }

    if soft && weights.subject_spread > 0 {
        for (&(cid, sid, day), _) in &v.sidx_csd {
            let hauptfach = prep
                .subject_by_id
                .get(sid)
                .is_some_and(|s| s.is_hauptfach);
            if hauptfach {
                s.spread_excess.insert(
                    (cid, sid, day),
                    pvars.add(variable().integer().min(0.0).max(max_day_hours)),
                );
            }
        }
    }

    s
}

/// The weighted signed objective; rewards enter as negative penalties.
pub(crate) fn build_objective(
    prep: &Prep<'_>,
    v: &Vars<'_>,
    s: &SoftVars<'_>,
    weights: &SoftWeights,
) -> Expression {
    let mut objective = Expression::from(0.0);

    if weights.gaps > 0 {
        let w = weights.gaps as f64;
        for var in s.is_gap.values() {
            objective += w * *var;
        }
        for var in s.gap_excess.values() {
            objective += w * *var;
        }
    }
    if weights.workload > 0 {
        let w = weights.workload as f64;
        for (tid, hmax) in &s.day_hours_max {
            objective += w * *hmax;
            if let Some(hmin) = s.day_hours_min.get(tid) {
                objective -= w * *hmin;
            }
        }
    }
    if weights.day_wishes > 0 {
        let w = weights.day_wishes as f64;
        for var in s.worked_on.values() {
            objective += w * *var;
        }
    }
    if weights.compact > 0 {
        let w = weights.compact as f64;
        let first = prep.slots.periods().first().copied().unwrap_or(1);
        let last = prep.model.time_grid.sek1_max_period;
        for ((_, _, p), act) in &v.act_teacher {
            if *p == first || *p == last {
                objective += w * *act;
            }
        }
    }
    if weights.double_lessons > 0 {
        let w = weights.double_lessons as f64;
        for ((_, _, sid, _, _), y) in &v.double {
            let optional = prep
                .subject_by_id
                .get(sid)
                .is_some_and(|s| s.double_preferred && !s.double_required);
            if optional {
                objective -= w * *y;
            }
        }
    }
    if weights.subject_spread > 0 {
        let w = weights.subject_spread as f64;
        for var in s.spread_excess.values() {
            objective += w * *var;
        }
    }
    if weights.deputat_dev > 0 {
        let w = weights.deputat_dev as f64;
        for var in s.deputat_dev.values() {
            objective += w * *var;
        }
    }

    objective
}

fn sum(vars: &[Variable]) -> Expression {
    let mut e = Expression::from(0.0);
    for v in vars {
        e += *v;
    }
    e
}

/// Posts every hard constraint and all soft-variable links.
pub(crate) fn post_constraints<'a, M: SolverModel>(
    mut model: M,
    prep: &Prep<'a>,
    v: &Vars<'a>,
    s: &SoftVars<'a>,
    opts: &BuildOptions,
    n: &mut usize,
) -> M {
    model = link_activity(model, v, n);
    model = add_unique_teacher(model, v, n);
    model = add_curriculum(model, prep, v, n);
    model = add_slot_implies_assign(model, v, n);
    model = add_deputat_band(model, prep, v, opts, n);
    if opts.room_limits {
        model = add_room_capacity(model, prep, v, n);
    }
    if opts.compactness {
        model = add_class_compactness(model, prep, v, n);
    }
    model = add_max_hours_per_day(model, prep, v, n);
    if opts.couplings {
        model = add_coupling_constraints(model, prep, v, n);
    }
    model = add_double_linkage(model, v, n);
    if opts.enforce_doubles {
        model = add_double_counts(model, prep, v, n);
    }
    model = add_gap_bounds(model, prep, v, s, opts, n);
    model = add_track_sync(model, prep, v, n);
    model = add_pins(model, prep, v, n);
    model = add_fixed_entries(model, v, opts, n);
    model = add_soft_links(model, prep, v, s, n);
    model
}

/// act = sum of its terms; a binary aggregate doubles as the <= 1 cap, so
/// this carries the teacher and class no-overlap rules at the same time.
fn link_activity<'a, M: SolverModel>(mut model: M, v: &Vars<'a>, n: &mut usize) -> M {
    for (&(cid, day, p), act) in &v.act_class {
        let mut terms = Expression::from(0.0);
        if let Some(vars) = v.sidx_cdp.get(&(cid, day, p)) {
            terms += sum(vars);
        }
        if let Some(vars) = v.uidx_cdp.get(&(cid, day, p)) {
            terms += sum(vars);
        }
        model = model.with(terms.eq(*act));
        *n += 1;
    }
    for (&(tid, day, p), act) in &v.act_teacher {
        let mut terms = Expression::from(0.0);
        if let Some(vars) = v.sidx_tdp.get(&(tid, day, p)) {
            terms += sum(vars);
        }
        if let Some(vars) = v.busy_tdp.get(&(tid, day, p)) {
            terms += sum(vars);
        }
        model = model.with(terms.eq(*act));
        *n += 1;
    }
    model
}

/// Exactly one teacher per (class, subject).
fn add_unique_teacher<'a, M: SolverModel>(mut model: M, v: &Vars<'a>, n: &mut usize) -> M {
    let mut by_cs: BTreeMap<(&str, &str), Vec<Variable>> = BTreeMap::new();
    for (&(_, cid, sid), var) in &v.assign {
        by_cs.entry((cid, sid)).or_default().push(*var);
    }
    for (_, vars) in by_cs {
        model = model.with(sum(&vars).eq(1.0));
        *n += 1;
    }
    model
}

/// The slot sum per (class, subject) equals the curriculum hours.
fn add_curriculum<'a, M: SolverModel>(
    mut model: M,
    prep: &Prep<'a>,
    v: &Vars<'a>,
    n: &mut usize,
) -> M {
    for class in &prep.classes {
        let cid = class.id.0.as_str();
        for (subject_id, hours) in &class.curriculum {
            if *hours == 0 || prep.is_covered(cid, subject_id) {
                continue;
            }
            if let Some(vars) = v.sidx_cs.get(&(cid, subject_id.0.as_str())) {
                model = model.with(sum(vars).eq(*hours as f64));
                *n += 1;
            }
        }
    }
    model
}

/// A placed lesson implies its assignment: x <= a.
fn add_slot_implies_assign<'a, M: SolverModel>(mut model: M, v: &Vars<'a>, n: &mut usize) -> M {
    for (&(tid, cid, sid, _, _), x) in &v.slot {
        if let Some(a) = v.assign.get(&(tid, cid, sid)) {
            model = model.with((*x - *a).leq(0.0));
            *n += 1;
        }
    }
    model
}

/// Deputat band over direct hours plus coupling-group hours.
fn add_deputat_band<'a, M: SolverModel>(
    mut model: M,
    prep: &Prep<'a>,
    v: &Vars<'a>,
    opts: &BuildOptions,
    n: &mut usize,
) -> M {
    for teacher in &prep.teachers {
        let tid = teacher.id.0.as_str();
        let mut load = Expression::from(0.0);
        let mut any = false;
        if let Some(vars) = v.sidx_t.get(tid) {
            load += sum(vars);
            any = true;
        }
        if let Some(groups) = v.gidx_t.get(tid) {
            for (g, hours) in groups {
                load += *hours * *g;
                any = true;
            }
        }
        if !any {
            continue;
        }
        let min = teacher.deputat_min.saturating_sub(opts.deputat_slack) as f64;
        let max = (teacher.deputat_max + opts.deputat_slack) as f64;
        model = model.with(load.clone().geq(min));
        model = model.with(load.leq(max));
        *n += 2;
    }
    model
}

/// Per room type and slot, at most `capacity` concurrent lessons.
fn add_room_capacity<'a, M: SolverModel>(
    mut model: M,
    prep: &Prep<'a>,
    v: &Vars<'a>,
    n: &mut usize,
) -> M {
    let capacity: BTreeMap<&str, u32> = prep
        .model
        .rooms
        .iter()
        .map(|r| (r.id.0.as_str(), r.capacity))
        .collect();
    for ((room, _, _), vars) in &v.ridx {
        let Some(cap) = capacity.get(room) else {
            continue;
        };
        model = model.with(sum(vars).leq(*cap as f64));
        *n += 1;
    }
    model
}

/// The active periods of a Sek-I class-day form a prefix of the day.
fn add_class_compactness<'a, M: SolverModel>(
    mut model: M,
    prep: &Prep<'a>,
    v: &Vars<'a>,
    n: &mut usize,
) -> M {
    for class in &prep.classes {
        if class.is_course {
            continue;
        }
        let cid = class.id.0.as_str();
        let periods = &prep.class_periods[cid];
        for day in 0..prep.days {
            for w in periods.windows(2) {
                let (Some(curr), Some(next)) = (
                    v.act_class.get(&(cid, day, w[0])),
                    v.act_class.get(&(cid, day, w[1])),
                ) else {
                    continue;
                };
                model = model.with((*next - *curr).leq(0.0));
                *n += 1;
            }
        }
    }
    model
}

/// Daily teaching-hours cap per teacher.
fn add_max_hours_per_day<'a, M: SolverModel>(
    mut model: M,
    prep: &Prep<'a>,
    v: &Vars<'a>,
    n: &mut usize,
) -> M {
    for teacher in &prep.teachers {
        let tid = teacher.id.0.as_str();
        for day in 0..prep.days {
            let vars: Vec<Variable> = v
                .act_teacher
                .range((tid, day, 0)..=(tid, day, u8::MAX))
                .map(|(_, var)| *var)
                .collect();
            if vars.is_empty() {
                continue;
            }
            model = model.with(sum(&vars).leq(teacher.max_hours_per_day as f64));
            *n += 1;
        }
    }
    model
}

/// Coupling hours, one teacher per group, busy products, availability.
fn add_coupling_constraints<'a, M: SolverModel>(
    mut model: M,
    prep: &Prep<'a>,
    v: &Vars<'a>,
    n: &mut usize,
) -> M {
    for coupling in &prep.couplings {
        let kid = coupling.id.0.as_str();

        // The coupling fills its weekly hours.
        if let Some(vars) = v.uidx_k.get(kid) {
            model = model.with(sum(vars).eq(coupling.hours_per_week as f64));
            *n += 1;
        }

        for (g_idx, _) in coupling.groups.iter().enumerate() {
            // Exactly one teacher per group.
            let g_vars: Vec<Variable> = v
                .group_assign
                .iter()
                .filter(|((k, i, _), _)| *k == kid && *i == g_idx)
                .map(|(_, var)| *var)
                .collect();
            if !g_vars.is_empty() {
                model = model.with(sum(&g_vars).eq(1.0));
                *n += 1;
            }
        }
    }

    // Busy products: b = u AND g.
    for (&(kid, g_idx, tid, day, p), b) in &v.group_busy {
        let Some(u) = v.couple_slot.get(&(kid, day, p)) else {
            continue;
        };
        let Some(g) = v.group_assign.get(&(kid, g_idx, tid)) else {
            continue;
        };
        model = model.with((*u + *g - *b).leq(1.0));
        model = model.with((*b - *u).leq(0.0));
        model = model.with((*b - *g).leq(0.0));
        *n += 3;
    }

    // A group teacher must be free at every coupling slot.
    for (&(kid, _, tid), g) in &v.group_assign {
        let blocked = &prep.unavailable[tid];
        for &(day, p) in blocked.iter() {
            if let Some(u) = v.couple_slot.get(&(kid, day, p)) {
                model = model.with((*u + *g).leq(1.0));
                *n += 1;
            }
        }
    }

    model
}

/// Double linkage: y <=> both halves of the block are taught.
fn add_double_linkage<'a, M: SolverModel>(mut model: M, v: &Vars<'a>, n: &mut usize) -> M {
    for (&(tid, cid, sid, day, bs), y) in &v.double {
        let Some(x1) = v.slot.get(&(tid, cid, sid, day, bs)) else {
            continue;
        };
        let Some(x2) = v.slot.get(&(tid, cid, sid, day, bs + 1)) else {
            continue;
        };
        model = model.with((*y - *x1).leq(0.0));
        model = model.with((*y - *x2).leq(0.0));
        model = model.with((*x1 + *x2 - *y).leq(1.0));
        *n += 3;
    }
    model
}

/// Double counts for double_required subjects, with the odd-hours
/// singleton forced onto a double-free day.
fn add_double_counts<'a, M: SolverModel>(
    mut model: M,
    prep: &Prep<'a>,
    v: &Vars<'a>,
    n: &mut usize,
) -> M {
    let max_doubles_per_day = prep.model.time_grid.double_blocks.len() as f64;
    for class in &prep.classes {
        let cid = class.id.0.as_str();
        for (subject_id, &hours) in &class.curriculum {
            let sid = subject_id.0.as_str();
            if hours == 0 || prep.is_covered(cid, subject_id) {
                continue;
            }
            let required = prep
                .subject_by_id
                .get(sid)
                .is_some_and(|s| s.double_required);
            if !required {
                continue;
            }
            if hours == 1 {
                tracing::warn!(
                    class = cid,
                    subject = sid,
                    "double periods required but only one weekly hour; scheduling a single"
                );
                continue;
            }
            // An empty sum still gets posted: a class whose raster admits
            // no double block cannot satisfy the requirement.
            let y_sum = v
                .yidx_cs
                .get(&(cid, sid))
                .map(|vars| sum(vars))
                .unwrap_or_else(|| Expression::from(0.0));
            model = model.with(y_sum.eq((hours / 2) as f64));
            *n += 1;

            if hours % 2 == 1 {
                let sing_vars: Vec<Variable> = (0..prep.days)
                    .filter_map(|d| v.single_day.get(&(cid, sid, d)).copied())
                    .collect();
                if sing_vars.is_empty() {
                    continue;
                }
                model = model.with(sum(&sing_vars).eq(1.0));
                *n += 1;
                for day in 0..prep.days {
                    let Some(sing) = v.single_day.get(&(cid, sid, day)) else {
                        continue;
                    };
                    let x_day = v
                        .sidx_csd
                        .get(&(cid, sid, day))
                        .map(|vars| sum(vars))
                        .unwrap_or_else(|| Expression::from(0.0));
                    let y_day = v
                        .yidx_csd
                        .get(&(cid, sid, day))
                        .map(|vars| sum(vars))
                        .unwrap_or_else(|| Expression::from(0.0));
                    // The stray hour may only sit on the singleton day, and
                    // that day hosts no double of the same subject.
                    model = model.with((x_day - 2.0 * y_day.clone() - *sing).leq(0.0));
                    model = model.with((y_day + max_doubles_per_day * *sing).leq(max_doubles_per_day));
                    *n += 2;
                }
            }
        }
    }
    model
}

/// Gap caps and indicator links: a period is a gap when the teacher is
/// inactive there but active both earlier and later that day.
fn add_gap_bounds<'a, M: SolverModel>(
    mut model: M,
    prep: &Prep<'a>,
    v: &Vars<'a>,
    s: &SoftVars<'a>,
    opts: &BuildOptions,
    n: &mut usize,
) -> M {
    for teacher in &prep.teachers {
        let tid = teacher.id.0.as_str();
        let mut week_gaps: Vec<Variable> = Vec::new();
        for day in 0..prep.days {
            let periods = teacher_day_periods(v, tid, day);
            let mut day_gaps: Vec<Variable> = Vec::new();
            for (i, &p) in periods.iter().enumerate() {
                let Some(gap) = s.is_gap.get(&(tid, day, p)) else {
                    continue;
                };
                let before = s.gap_before[&(tid, day, p)];
                let after = s.gap_after[&(tid, day, p)];
                for &q in &periods[..i] {
                    model = model.with((v.act_teacher[&(tid, day, q)] - before).leq(0.0));
                    *n += 1;
                }
                for &q in &periods[i + 1..] {
                    model = model.with((v.act_teacher[&(tid, day, q)] - after).leq(0.0));
                    *n += 1;
                }
                let act = v.act_teacher[&(tid, day, p)];
                model = model.with((before + after - act - *gap).leq(1.0));
                *n += 1;
                day_gaps.push(*gap);
                week_gaps.push(*gap);
            }
            if !day_gaps.is_empty() {
                model = model.with(sum(&day_gaps).leq(teacher.max_gaps_per_day as f64));
                *n += 1;
                if opts.use_soft {
                    if let Some(excess) = s.gap_excess.get(&(tid, day)) {
                        model = model.with((sum(&day_gaps) - *excess).leq(1.0));
                        *n += 1;
                    }
                }
            }
        }
        if teacher.max_gaps_per_week > 0 && !week_gaps.is_empty() {
            model = model.with(sum(&week_gaps).leq(teacher.max_gaps_per_week as f64));
            *n += 1;
        }
    }
    model
}

/// All courses of a track share their activity pattern slot by slot.
fn add_track_sync<'a, M: SolverModel>(
    mut model: M,
    prep: &Prep<'a>,
    v: &Vars<'a>,
    n: &mut usize,
) -> M {
    for track in &prep.tracks {
        let Some(first) = track.course_ids.first() else {
            continue;
        };
        let lead = first.0.as_str();
        for other in &track.course_ids[1..] {
            let oid = other.0.as_str();
            for ((cid, day, p), act_lead) in v.act_class.range((lead, 0, 0)..=(lead, u8::MAX, u8::MAX)) {
                let _ = cid;
                if let Some(act_other) = v.act_class.get(&(oid, *day, *p)) {
                    model = model.with((*act_lead - *act_other).eq(0.0));
                    *n += 1;
                }
            }
        }
    }
    model
}

/// CP: pinned lessons are forced in.
fn add_pins<'a, M: SolverModel>(mut model: M, prep: &Prep<'a>, v: &Vars<'a>, n: &mut usize) -> M {
    for pin in &prep.model.pins {
        let key = (
            pin.teacher.0.as_str(),
            pin.class.0.as_str(),
            pin.subject.0.as_str(),
            pin.slot.day,
            pin.slot.period,
        );
        match v.slot.get(&key) {
            Some(x) => {
                model = model.with(Expression::from(*x).eq(1.0));
                *n += 1;
            }
            None => {
                tracing::warn!(
                    teacher = %pin.teacher,
                    class = %pin.class,
                    subject = %pin.subject,
                    slot = %pin.slot,
                    "pin ignored: no matching slot variable"
                );
            }
        }
    }
    model
}

/// Incremental re-solve: keep unaffected placements where they were.
fn add_fixed_entries<'a, M: SolverModel>(
    mut model: M,
    v: &Vars<'a>,
    opts: &BuildOptions,
    n: &mut usize,
) -> M {
    for entry in &opts.fixed_entries {
        if entry.coupling.is_some() {
            continue;
        }
        let key = (
            entry.teacher.0.as_str(),
            entry.class.0.as_str(),
            entry.subject.0.as_str(),
            entry.day,
            entry.period,
        );
        match v.slot.get(&key) {
            Some(x) => {
                model = model.with(Expression::from(*x).eq(1.0));
                *n += 1;
            }
            None => {
                tracing::warn!(
                    teacher = %entry.teacher,
                    class = %entry.class,
                    "fixed placement has no slot variable; left to the solver"
                );
            }
        }
    }
    model
}

/// Links for the soft auxiliaries: day-load spread, day wishes,
/// subject spread and deputat deviation.
fn add_soft_links<'a, M: SolverModel>(
    mut model: M,
    prep: &Prep<'a>,
    v: &Vars<'a>,
    s: &SoftVars<'a>,
    n: &mut usize,
) -> M {
    for teacher in &prep.teachers {
        let tid = teacher.id.0.as_str();

        if let (Some(hmax), Some(hmin)) = (s.day_hours_max.get(tid), s.day_hours_min.get(tid)) {
            for day in 0..prep.days {
                let vars: Vec<Variable> = v
                    .act_teacher
                    .range((tid, day, 0)..=(tid, day, u8::MAX))
                    .map(|(_, var)| *var)
                    .collect();
                let hours = sum(&vars);
                model = model.with((hours.clone() - *hmax).leq(0.0));
                model = model.with((*hmin - hours).leq(0.0));
                *n += 2;
            }
        }

        if let Some(dev) = s.deputat_dev.get(tid) {
            let mut load = Expression::from(0.0);
            if let Some(vars) = v.sidx_t.get(tid) {
                load += sum(vars);
            }
            if let Some(groups) = v.gidx_t.get(tid) {
                for (g, hours) in groups {
                    load += *hours * *g;
                }
            }
            let target = teacher.deputat as f64;
            model = model.with((load.clone() - target - *dev).leq(0.0));
            model = model.with((target - load - *dev).leq(0.0));
            *n += 2;
        }

        for &day in &teacher.preferred_free_days {
            if let Some(worked) = s.worked_on.get(&(tid, day)) {
                let vars: Vec<Variable> = v
                    .act_teacher
                    .range((tid, day, 0)..=(tid, day, u8::MAX))
                    .map(|(_, var)| *var)
                    .collect();
                for act in vars {
                    model = model.with((act - *worked).leq(0.0));
                    *n += 1;
                }
            }
        }
    }

    for (&(cid, sid, day), excess) in &s.spread_excess {
        let x_day = v
            .sidx_csd
            .get(&(cid, sid, day))
            .map(|vars| sum(vars))
            .unwrap_or_else(|| Expression::from(0.0));
        let y_day = v
            .yidx_csd
            .get(&(cid, sid, day))
            .map(|vars| sum(vars))
            .unwrap_or_else(|| Expression::from(0.0));
        model = model.with((x_day - y_day - *excess).leq(1.0));
        *n += 1;
    }

    model
}

// ---------------------------------------------------------------------------
// Assignment-only model (pass 1 of the two-pass strategy)
// ---------------------------------------------------------------------------

pub(crate) struct AssignVars<'a> {
    pub assign: BTreeMap<Triple<'a>, Variable>,
    pub group_assign: BTreeMap<(&'a str, usize, &'a str), Variable>,
    pub deputat_dev: BTreeMap<&'a str, Variable>,
    pub dev_max: Option<Variable>,
    pub dev_min: Option<Variable>,
}

impl AssignVars<'_> {
    pub fn count(&self) -> usize {
        self.assign.len() + self.group_assign.len() + self.deputat_dev.len() + 2
    }
}

pub(crate) fn declare_assignment_vars<'a>(
    prep: &Prep<'a>,
    weights: &SoftWeights,
    use_soft: bool,
    pvars: &mut ProblemVariables,
) -> AssignVars<'a> {
    let mut assign = BTreeMap::new();
    for class in &prep.classes {
        let cid = class.id.0.as_str();
        for (subject_id, hours) in &class.curriculum {
            if *hours == 0 || prep.is_covered(cid, subject_id) {
                continue;
            }
            let sid = subject_id.0.as_str();
            for teacher in prep.teachers_by_subject.get(sid).cloned().unwrap_or_default() {
                if class.is_course && !teacher.can_teach_sek2 {
                    continue;
                }
                assign.insert(
                    (teacher.id.0.as_str(), cid, sid),
                    pvars.add(variable().binary()),
                );
            }
        }
    }

    let mut group_assign = BTreeMap::new();
    for coupling in &prep.couplings {
        let kid = coupling.id.0.as_str();
        let any_course = coupling
            .involved_classes
            .iter()
            .any(|c| prep.model.class(c).is_some_and(|c| c.is_course));
        for (g_idx, group) in coupling.groups.iter().enumerate() {
            for teacher in prep
                .teachers_by_subject
                .get(group.subject.0.as_str())
                .cloned()
                .unwrap_or_default()
            {
                if any_course && !teacher.can_teach_sek2 {
                    continue;
                }
                group_assign.insert(
                    (kid, g_idx, teacher.id.0.as_str()),
                    pvars.add(variable().binary()),
                );
            }
        }
    }

    let mut deputat_dev = BTreeMap::new();
    let mut dev_max = None;
    let mut dev_min = None;
    if use_soft && (weights.deputat_dev > 0 || weights.workload > 0) {
        for teacher in &prep.teachers {
            deputat_dev.insert(
                teacher.id.0.as_str(),
                pvars.add(variable().integer().min(0.0).max(80.0)),
            );
        }
        if weights.workload > 0 {
            dev_max = Some(pvars.add(variable().integer().min(0.0).max(80.0)));
            dev_min = Some(pvars.add(variable().integer().min(0.0).max(80.0)));
        }
    }

    AssignVars {
        assign,
        group_assign,
        deputat_dev,
        dev_max,
        dev_min,
    }
}

pub(crate) fn post_assignment_constraints<'a, M: SolverModel>(
    mut model: M,
    prep: &Prep<'a>,
    v: &AssignVars<'a>,
    opts: &BuildOptions,
    n: &mut usize,
) -> M {
    let mut by_cs: BTreeMap<(&str, &str), Vec<Variable>> = BTreeMap::new();
    for (&(_, cid, sid), var) in &v.assign {
        by_cs.entry((cid, sid)).or_default().push(*var);
    }
    for (_, vars) in by_cs {
        model = model.with(sum(&vars).eq(1.0));
        *n += 1;
    }

    for coupling in &prep.couplings {
        let kid = coupling.id.0.as_str();
        for (g_idx, _) in coupling.groups.iter().enumerate() {
            let vars: Vec<Variable> = v
                .group_assign
                .iter()
                .filter(|((k, i, _), _)| *k == kid && *i == g_idx)
                .map(|(_, var)| *var)
                .collect();
            if !vars.is_empty() {
                model = model.with(sum(&vars).eq(1.0));
                *n += 1;
            }
        }
    }

    for teacher in &prep.teachers {
        let tid = teacher.id.0.as_str();
        let mut load = Expression::from(0.0);
        let mut any = false;
        for (&(t, cid, sid), var) in &v.assign {
            if t == tid {
                load += prep.subject_hours(cid, sid) as f64 * *var;
                any = true;
            }
        }
        for coupling in &prep.couplings {
            let kid = coupling.id.0.as_str();
            for (g_idx, group) in coupling.groups.iter().enumerate() {
                if let Some(g) = v.group_assign.get(&(kid, g_idx, tid)) {
                    load += group.hours_per_week as f64 * *g;
                    any = true;
                }
            }
        }
        if !any {
            continue;
        }
        let min = teacher.deputat_min.saturating_sub(opts.deputat_slack) as f64;
        let max = (teacher.deputat_max + opts.deputat_slack) as f64;
        model = model.with(load.clone().geq(min));
        model = model.with(load.clone().leq(max));
        *n += 2;

        if let Some(dev) = v.deputat_dev.get(tid) {
            let target = teacher.deputat as f64;
            model = model.with((load.clone() - target - *dev).leq(0.0));
            model = model.with((target - load - *dev).leq(0.0));
            *n += 2;
            if let (Some(dmax), Some(dmin)) = (v.dev_max, v.dev_min) {
                model = model.with((*dev - dmax).leq(0.0));
                model = model.with((dmin - *dev).leq(0.0));
                *n += 2;
            }
        }
    }

    // Pins decide the assignment layer up front.
    for pin in &prep.model.pins {
        let key = (
            pin.teacher.0.as_str(),
            pin.class.0.as_str(),
            pin.subject.0.as_str(),
        );
        if let Some(a) = v.assign.get(&key) {
            model = model.with(Expression::from(*a).eq(1.0));
            *n += 1;
        }
    }

    model
}

/// Pass-1 objective: deputat deviation plus the spread of deviations
/// (day-level balance is a placement concern, settled in pass 2).
pub(crate) fn build_assignment_objective(v: &AssignVars<'_>, weights: &SoftWeights) -> Expression {
    let mut objective = Expression::from(0.0);
    if weights.deputat_dev > 0 {
        let w = weights.deputat_dev as f64;
        for dev in v.deputat_dev.values() {
            objective += w * *dev;
        }
    }
    if weights.workload > 0 {
        if let (Some(dmax), Some(dmin)) = (v.dev_max, v.dev_min) {
            let w = weights.workload as f64;
            objective += w * dmax;
            objective -= w * dmin;
        }
    }
    objective
}
