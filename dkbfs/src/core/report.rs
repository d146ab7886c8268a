// SPDX-License-Identifier: MIT

//! Result accumulator shared by detection, mutation and check passes.

use core::fmt;

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Info,
    Warn,
    Error,
}

#[derive(Clone, Debug)]
pub struct Finding {
    pub sev: Severity,
    pub code: &'static str,
    pub msg: String,
}

impl Finding {
    pub fn info(code: &'static str, msg: impl Into<String>) -> Self {
        Self {
            sev: Severity::Info,
            code,
            msg: msg.into(),
        }
    }

    pub fn warn(code: &'static str, msg: impl Into<String>) -> Self {
        Self {
            sev: Severity::Warn,
            code,
            msg: msg.into(),
        }
    }

    pub fn err(code: &'static str, msg: impl Into<String>) -> Self {
        Self {
            sev: Severity::Error,
            code,
            msg: msg.into(),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct Report {
    pub findings: Vec<Finding>,
}

impl Report {
    pub fn push(&mut self, f: Finding) {
        match f.sev {
            Severity::Info => log::debug!("[{}] {}", f.code, f.msg),
            Severity::Warn => log::warn!("[{}] {}", f.code, f.msg),
            Severity::Error => log::error!("[{}] {}", f.code, f.msg),
        }
        self.findings.push(f)
    }

    pub fn info(&mut self, code: &'static str, msg: impl Into<String>) {
        self.push(Finding::info(code, msg));
    }

    pub fn warn(&mut self, code: &'static str, msg: impl Into<String>) {
        self.push(Finding::warn(code, msg));
    }

    pub fn err(&mut self, code: &'static str, msg: impl Into<String>) {
        self.push(Finding::err(code, msg));
    }

    pub fn extend(&mut self, other: Report) {
        self.findings.extend(other.findings);
    }

    pub fn clear(&mut self) {
        self.findings.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.findings.is_empty()
    }

    pub fn worst(&self) -> Option<Severity> {
        self.findings.iter().map(|f| f.sev).max()
    }

    /// Worst-severity summary: `< 0` hard error, `0` clean, `> 0` warning.
    pub fn level(&self) -> i32 {
        match self.worst() {
            Some(Severity::Error) => -1,
            Some(Severity::Warn) => 1,
            _ => 0,
        }
    }

    pub fn has_error(&self) -> bool {
        self.level() < 0
    }

    pub fn first_error(&self) -> Option<&str> {
        self.findings
            .iter()
            .find(|f| f.sev == Severity::Error)
            .map(|f| f.msg.as_str())
    }

    pub fn count(&self, s: Severity) -> usize {
        self.findings.iter().filter(|f| f.sev == s).count()
    }

    /// Display of findings at or above `min`.
    pub fn display_min(&self, min: Severity) -> ReportDisplay<'_> {
        ReportDisplay { report: self, min }
    }
}

pub struct ReportDisplay<'a> {
    report: &'a Report,
    min: Severity,
}

impl fmt::Display for ReportDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for x in self.report.findings.iter().filter(|x| x.sev >= self.min) {
            let tag = match x.sev {
                Severity::Info => "info",
                Severity::Warn => "warn",
                Severity::Error => "error",
            };
            writeln!(f, "{tag:>5} [{}] {}", x.code, x.msg)?;
        }
        Ok(())
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.display_min(Severity::Info).fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_is_worst_severity() {
        let mut r = Report::default();
        assert_eq!(r.level(), 0);
        r.info("A", "fine");
        assert_eq!(r.level(), 0);
        r.warn("B", "odd");
        assert_eq!(r.level(), 1);
        r.err("C", "bad");
        r.warn("D", "odd again");
        assert_eq!(r.level(), -1);
        assert_eq!(r.first_error(), Some("bad"));
        assert_eq!(r.count(Severity::Warn), 2);
    }

    #[test]
    fn display_filters_by_severity() {
        let mut r = Report::default();
        r.info("A", "one");
        r.err("B", "two");
        let s = r.display_min(Severity::Warn).to_string();
        assert!(s.contains("two"));
        assert!(!s.contains("one"));
    }
}
