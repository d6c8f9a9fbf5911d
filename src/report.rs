//! CSV report output.
//!
//! Two files per source: `<name>_structured.csv` assigns every line its
//! template id, template text, and level; `<name>_templates.csv` lists one
//! row per cluster, sorted by level. Template ids are generated from the
//! template text at report time, so clusters that generalized further after
//! a line was added still report their final shape.

use std::fs;
use std::path::Path;

use crate::error::SiftError;
use crate::miner::{template_id, LogCluster};
use crate::preprocessor::LineRecord;

/// Per-line assignment columns, indexed by `line_id - 1`.
struct Assignments {
    ids: Vec<String>,
    templates: Vec<String>,
    levels: Vec<String>,
}

fn build_assignments(count: usize, clusters: &[LogCluster]) -> Assignments {
    let mut assignments = Assignments {
        ids: vec![String::new(); count],
        templates: vec![String::new(); count],
        levels: vec![String::new(); count],
    };

    for cluster in clusters {
        let text = cluster.template_text();
        let id = template_id(&text);
        for &line_id in &cluster.member_ids {
            if line_id == 0 || line_id > count {
                continue;
            }
            let idx = line_id - 1;
            assignments.ids[idx] = id.clone();
            assignments.templates[idx] = text.clone();
            assignments.levels[idx] = cluster.level.clone();
        }
    }

    assignments
}

/// Write both reports for one source.
pub fn write_reports(
    out_dir: &Path,
    name: &str,
    headers: &[String],
    records: &[LineRecord],
    clusters: &[LogCluster],
) -> Result<(), SiftError> {
    fs::create_dir_all(out_dir)?;
    let assignments = build_assignments(records.len(), clusters);
    let level_idx = headers.iter().position(|h| h == "Level");

    let structured_path = out_dir.join(format!("{}_structured.csv", name));
    let mut writer = csv::Writer::from_path(&structured_path)?;

    let mut header_row: Vec<&str> = vec!["LineId"];
    header_row.extend(headers.iter().map(String::as_str));
    header_row.push("EventId");
    header_row.push("EventTemplate");
    if level_idx.is_none() {
        header_row.push("Level");
    }
    writer.write_record(&header_row)?;

    for (i, record) in records.iter().enumerate() {
        let mut row: Vec<String> = Vec::with_capacity(header_row.len());
        row.push(record.line_id.to_string());
        for (fi, field) in record.fields.iter().enumerate() {
            // The mined level supersedes the raw Level column.
            if Some(fi) == level_idx {
                row.push(assignments.levels[i].clone());
            } else {
                row.push(field.clone());
            }
        }
        row.push(assignments.ids[i].clone());
        row.push(assignments.templates[i].clone());
        if level_idx.is_none() {
            row.push(assignments.levels[i].clone());
        }
        writer.write_record(&row)?;
    }
    writer.flush().map_err(SiftError::Io)?;

    let templates_path = out_dir.join(format!("{}_templates.csv", name));
    let mut writer = csv::Writer::from_path(&templates_path)?;
    writer.write_record(["EventId", "Level", "EventTemplate", "Occurrences"])?;

    let mut rows: Vec<(String, &str, String, usize)> = clusters
        .iter()
        .map(|c| {
            let text = c.template_text();
            (template_id(&text), c.level.as_str(), text, c.occurrences())
        })
        .collect();
    rows.sort_by(|a, b| a.1.cmp(b.1));

    for (id, level, text, occurrences) in rows {
        let occurrences = occurrences.to_string();
        writer.write_record([id.as_str(), level, text.as_str(), occurrences.as_str()])?;
    }
    writer.flush().map_err(SiftError::Io)?;

    tracing::info!(
        source = name,
        structured = %structured_path.display(),
        templates = %templates_path.display(),
        "reports written"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::miner::LogCluster;

    fn cluster(template: &str, level: &str, members: &[usize]) -> LogCluster {
        LogCluster {
            template: template.split_whitespace().map(str::to_string).collect(),
            level: level.to_string(),
            member_ids: members.to_vec(),
        }
    }

    fn record(line_id: usize, fields: &[&str]) -> LineRecord {
        LineRecord {
            line_id,
            fields: fields.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_structured_report_assigns_every_line() {
        let dir = tempfile::tempdir().unwrap();
        let headers = vec!["Level".to_string(), "Content".to_string()];
        let records = vec![
            record(1, &["INFO", "started worker 1"]),
            record(2, &["INFO", "started worker 2"]),
        ];
        let clusters = vec![cluster("started worker <*>", "INFO", &[1, 2])];

        write_reports(dir.path(), "app", &headers, &records, &clusters).unwrap();

        let content =
            std::fs::read_to_string(dir.path().join("app_structured.csv")).unwrap();
        let mut lines = content.lines();
        assert_eq!(
            lines.next().unwrap(),
            "LineId,Level,Content,EventId,EventTemplate"
        );
        let row: Vec<&str> = lines.next().unwrap().split(',').collect();
        assert_eq!(row[0], "1");
        assert_eq!(row[2], "started worker 1");
        assert_eq!(row[3].len(), 8);
        assert_eq!(row[4], "started worker <*>");
        assert_eq!(content.lines().count(), 3);
    }

    #[test]
    fn test_template_report_sorted_by_level() {
        let dir = tempfile::tempdir().unwrap();
        let headers = vec!["Content".to_string()];
        let records = vec![
            record(1, &["disk failing"]),
            record(2, &["all fine"]),
            record(3, &["disk failing"]),
        ];
        let clusters = vec![
            cluster("disk failing", "WARN", &[1, 3]),
            cluster("all fine", "INFO", &[2]),
        ];

        write_reports(dir.path(), "app", &headers, &records, &clusters).unwrap();

        let content =
            std::fs::read_to_string(dir.path().join("app_templates.csv")).unwrap();
        let rows: Vec<&str> = content.lines().collect();
        assert_eq!(rows[0], "EventId,Level,EventTemplate,Occurrences");
        assert!(rows[1].contains("INFO"));
        assert!(rows[1].contains("all fine"));
        assert!(rows[2].contains("WARN"));
        assert!(rows[2].ends_with("2"));
    }

    #[test]
    fn test_identical_template_text_keeps_distinct_rows() {
        let dir = tempfile::tempdir().unwrap();
        let headers = vec!["Content".to_string()];
        let records = vec![record(1, &["x y"]), record(2, &["x y"])];
        // Same text, distinct clusters: ids collide but rows do not merge.
        let clusters = vec![cluster("x y", "INFO", &[1]), cluster("x y", "INFO", &[2])];

        write_reports(dir.path(), "app", &headers, &records, &clusters).unwrap();

        let content =
            std::fs::read_to_string(dir.path().join("app_templates.csv")).unwrap();
        assert_eq!(content.lines().count(), 3);
    }
}
