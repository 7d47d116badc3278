// ABOUTME: Pure completion calculator over dossier snapshots
// ABOUTME: Stage percent counts required slots only; project percent weights stages equally

use serde::Serialize;

use crate::entities::{deliverable_file, deliverable_slot};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotState {
    pub required: bool,
    pub multi: bool,
    pub present_files: usize,
    pub active_files: usize,
}

impl SlotState {
    pub fn of(slot: &deliverable_slot::Model, files: &[deliverable_file::Model]) -> Self {
        let mine = files
            .iter()
            .filter(|f| f.stage_id == slot.stage_id && f.slot_key == slot.key);
        let (present, active) = mine.fold((0, 0), |(p, a), f| (p + 1, a + usize::from(f.is_active)));
        Self {
            required: slot.required,
            multi: slot.multi,
            present_files: present,
            active_files: active,
        }
    }

    pub fn is_done(&self) -> bool {
        if self.multi {
            self.present_files > 0
        } else {
            self.active_files > 0
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StageProgress {
    pub required_done: u32,
    pub required_total: u32,
    pub percent: u32,
}

pub fn stage_progress(slots: &[SlotState]) -> StageProgress {
    let required: Vec<_> = slots.iter().filter(|s| s.required).collect();
    let total = required.len() as u32;
    let done = required.iter().filter(|s| s.is_done()).count() as u32;
    let percent = if total == 0 {
        100
    } else {
        round_half_up(100 * done, total)
    };
    StageProgress {
        required_done: done,
        required_total: total,
        percent,
    }
}

/// Mean of stage percents over stages with at least one required slot; 0 when there are none.
pub fn project_progress(stages: &[StageProgress]) -> u32 {
    let counted: Vec<u32> = stages
        .iter()
        .filter(|s| s.required_total > 0)
        .map(|s| s.percent)
        .collect();
    if counted.is_empty() {
        return 0;
    }
    round_half_up(counted.iter().sum(), counted.len() as u32)
}

fn round_half_up(numerator: u32, denominator: u32) -> u32 {
    (2 * numerator + denominator) / (2 * denominator)
}
