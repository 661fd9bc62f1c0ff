use crate::diagnostic::StepKind;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use unicode_width::UnicodeWidthStr;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub name: String,
    pub chain_id: u64,
    pub entries: Vec<Entry>,
    /// A write failed and the remaining steps were skipped.
    pub aborted: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Entry {
    pub index: usize,
    pub kind: StepKind,
    pub label: String,
    #[serde(flatten)]
    pub outcome: Outcome,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Outcome {
    Ok {
        value: Value,
        rendered: String,
    },
    Failed {
        error: String,
        #[serde(rename = "revertData", skip_serializing_if = "Option::is_none")]
        revert_data: Option<String>,
    },
}

impl Outcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, Outcome::Failed { .. })
    }
}

impl Report {
    pub fn new(name: impl Into<String>, chain_id: u64) -> Self {
        Self {
            name: name.into(),
            chain_id,
            entries: Vec::new(),
            aborted: false,
        }
    }

    pub fn failures(&self) -> impl Iterator<Item = &Entry> {
        self.entries.iter().filter(|entry| entry.outcome.is_failed())
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "== {} (chain {}) ==", self.name, self.chain_id)?;
        let width = self
            .entries
            .iter()
            .map(|entry| entry.label.width())
            .max()
            .unwrap_or_default();
        for entry in &self.entries {
            let (status, detail) = match &entry.outcome {
                Outcome::Ok { rendered, .. } => ("ok", rendered.clone()),
                Outcome::Failed {
                    error,
                    revert_data: Some(data),
                } => ("FAILED", format!("{error} [{data}]")),
                Outcome::Failed { error, .. } => ("FAILED", error.clone()),
            };
            let padding = " ".repeat(width - entry.label.width());
            writeln!(
                f,
                "[{:>2}] {status:<6} {:<7} {}{padding}  {detail}",
                entry.index, entry.kind, entry.label
            )?;
        }
        let failed = self.failures().count();
        write!(
            f,
            "{} step(s), {} ok, {failed} failed",
            self.entries.len(),
            self.entries.len() - failed
        )?;
        if self.aborted {
            write!(f, "\naborted: remaining steps skipped after a failed write")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]

    use super::*;
    use serde_json::json;

    fn sample() -> Report {
        Report {
            name: "oracle-status".to_string(),
            chain_id: 97,
            entries: vec![
                Entry {
                    index: 1,
                    kind: StepKind::Read,
                    label: "DreamOracle.topicCount".to_string(),
                    outcome: Outcome::Ok {
                        value: json!("3"),
                        rendered: "3".to_string(),
                    },
                },
                Entry {
                    index: 2,
                    kind: StepKind::Write,
                    label: "DreamOracle.settle".to_string(),
                    outcome: Outcome::Failed {
                        error: "execution reverted: Not owner".to_string(),
                        revert_data: Some("0x08c379a0".to_string()),
                    },
                },
            ],
            aborted: true,
        }
    }

    #[test]
    fn to_json__failed_entry__carries_status_and_revert_data() {
        // when
        let json: Value = serde_json::from_str(&sample().to_json().unwrap()).unwrap();

        // then
        assert_eq!(json["chainId"], json!(97));
        assert_eq!(json["aborted"], json!(true));
        assert_eq!(json["entries"][0]["status"], json!("ok"));
        assert_eq!(json["entries"][0]["kind"], json!("read"));
        assert_eq!(json["entries"][1]["status"], json!("failed"));
        assert_eq!(json["entries"][1]["revertData"], json!("0x08c379a0"));
    }

    #[test]
    fn display__aborted_report__summarises_and_flags_abort() {
        // when
        let text = sample().to_string();

        // then
        assert!(text.starts_with("== oracle-status (chain 97) =="));
        assert!(text.contains("FAILED"));
        assert!(text.contains("2 step(s), 1 ok, 1 failed"));
        assert!(text.ends_with("aborted: remaining steps skipped after a failed write"));
    }

    #[test]
    fn display__wide_labels__align_detail_column() {
        // given
        let mut report = sample();
        report.entries[0].label = "国库余额".to_string();
        report.entries[1].label = "DreamTreasury.buyback".to_string();
        report.aborted = false;

        // when
        let text = report.to_string();

        // then
        let lines: Vec<&str> = text.lines().skip(1).take(2).collect();
        let read_detail = lines[0].strip_suffix('3').unwrap();
        let write_detail = &lines[1][..lines[1].find("execution reverted").unwrap()];
        assert_eq!(read_detail.width(), write_detail.width());
    }
}
