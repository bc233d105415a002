//! Structured error reports.

use crate::error::RuntimeError;
use log::{debug, error};
use patchlang_common::EntityId;
use patchlang_compiler::LoadError;
use std::fmt;

/// Which half of the error taxonomy a report belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// A script failed to compile. Fatal to the world.
    Load,
    /// A playhead faulted. Fatal to that playhead only.
    Runtime,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorClass::Load => write!(f, "Load"),
            ErrorClass::Runtime => write!(f, "Runtime"),
        }
    }
}

/// Everything known about one failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorReport {
    pub class: ErrorClass,
    /// Short error kind, the same text bound to `_error_type`.
    pub label: String,
    /// `None` when the failing script was loaded outside any entity.
    pub entity: Option<EntityId>,
    pub script: String,
    /// Program counters from the base frame outward; the faulting address is last.
    pub pc_stack: Vec<usize>,
    /// Text of the offending instruction.
    pub code: String,
    pub info: String,
}

impl ErrorReport {
    pub fn runtime(
        err: &RuntimeError,
        entity: EntityId,
        script: &str,
        pc_stack: Vec<usize>,
        code: String,
    ) -> Self {
        let class = if err.is_fatal() {
            ErrorClass::Load
        } else {
            ErrorClass::Runtime
        };
        Self {
            class,
            label: err.label().to_string(),
            entity: Some(entity),
            script: script.to_string(),
            pc_stack,
            code,
            info: err.to_string(),
        }
    }

    pub fn load(err: &LoadError, entity: Option<EntityId>) -> Self {
        Self {
            class: ErrorClass::Load,
            label: err.label().to_string(),
            entity,
            script: err.script().to_string(),
            pc_stack: Vec::new(),
            code: String::new(),
            info: err.to_string(),
        }
    }
}

impl fmt::Display for ErrorReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} error: {}", self.class, self.label)?;
        match self.entity {
            Some(id) => writeln!(f, "Entity: {id}")?,
            None => writeln!(f, "Entity: none")?,
        }
        writeln!(f, "Script: {} at address(es) {:?}", self.script, self.pc_stack)?;
        if !self.code.is_empty() {
            writeln!(f, "Code: {}", self.code)?;
        }
        write!(f, "{}", self.info)
    }
}

/// Collects every report and logs it.
#[derive(Debug, Default)]
pub struct Reporter {
    reports: Vec<ErrorReport>,
}

impl Reporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a report. Hidden reports are kept but only logged at debug level.
    pub fn report(&mut self, report: ErrorReport, hidden: bool) {
        if hidden {
            debug!("suppressed {report}");
        } else {
            error!("{report}");
        }
        self.reports.push(report);
    }

    pub fn reports(&self) -> &[ErrorReport] {
        &self.reports
    }
}
