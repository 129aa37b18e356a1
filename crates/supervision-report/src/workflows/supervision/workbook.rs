use rust_xlsxwriter::{
    Color, ConditionalFormatCell, ConditionalFormatCellRule, Format, Workbook, Worksheet,
    XlsxError,
};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use super::domain::{ComplianceRange, MergedRow};

const MAX_SHEET_NAME: usize = 31;
const EMPTY_SHEET: &str = "No Data";

const HEADERS: [(&str, f64); 12] = [
    ("Clinic", 18.0),
    ("Provider ID", 14.0),
    ("Provider Name", 26.0),
    ("Service Location", 40.0),
    ("Direct Hours", 14.0),
    ("Supervision Hours", 18.0),
    ("Supervision %", 15.0),
    ("Certification Hours", 20.0),
    ("Certification Matched", 22.0),
    ("Combined Supervised Hours", 26.0),
    ("Combined %", 13.0),
    ("Compliance", 16.0),
];
const SUPERVISION_PCT_COL: u16 = 6;
const CERTIFICATION_MATCHED_COL: u16 = 8;
const COMBINED_PCT_COL: u16 = 10;

#[derive(Debug, thiserror::Error)]
pub enum WorkbookError {
    #[error("spreadsheet write failed: {0}")]
    Xlsx(#[from] XlsxError),
}

/// Writes one sheet per clinic, in clinic order, and returns the sheet names.
pub fn write_report(
    rows: &[MergedRow],
    compliance: &ComplianceRange,
    path: &Path,
) -> Result<Vec<String>, WorkbookError> {
    let mut by_clinic: BTreeMap<&str, Vec<&MergedRow>> = BTreeMap::new();
    for row in rows {
        by_clinic
            .entry(row.group.clinic.as_str())
            .or_default()
            .push(row);
    }

    let formats = Formats::new();
    let mut workbook = Workbook::new();
    let mut used = HashSet::new();
    let mut names = Vec::new();

    if by_clinic.is_empty() {
        let sheet = workbook.add_worksheet();
        sheet.set_name(EMPTY_SHEET)?;
        write_header(sheet, &formats)?;
        names.push(EMPTY_SHEET.to_string());
    }

    for (clinic, clinic_rows) in by_clinic {
        let name = unique_sheet_name(clinic, &mut used);
        let sheet = workbook.add_worksheet();
        sheet.set_name(&name)?;
        write_header(sheet, &formats)?;
        write_rows(sheet, &clinic_rows, &formats)?;
        highlight_out_of_range(sheet, clinic_rows.len() as u32, compliance, &formats)?;
        names.push(name);
    }

    workbook.save(path)?;
    Ok(names)
}

struct Formats {
    header: Format,
    hours: Format,
    percent: Format,
    below: Format,
    above: Format,
}

impl Formats {
    fn new() -> Self {
        Self {
            header: Format::new()
                .set_bold()
                .set_background_color(Color::RGB(0xD9E1F2)),
            hours: Format::new().set_num_format("0.00"),
            percent: Format::new().set_num_format("0.0%"),
            below: Format::new()
                .set_font_color(Color::RGB(0x9C0006))
                .set_background_color(Color::RGB(0xFFC7CE)),
            above: Format::new()
                .set_font_color(Color::RGB(0x9C5700))
                .set_background_color(Color::RGB(0xFFEB9C)),
        }
    }
}

fn write_header(sheet: &mut Worksheet, formats: &Formats) -> Result<(), XlsxError> {
    for (col, (title, width)) in HEADERS.iter().enumerate() {
        let col = col as u16;
        sheet.write_with_format(0, col, *title, &formats.header)?;
        sheet.set_column_width(col, *width)?;
    }
    sheet.set_freeze_panes(1, 0)?;
    Ok(())
}

fn write_rows(sheet: &mut Worksheet, rows: &[&MergedRow], formats: &Formats) -> Result<(), XlsxError> {
    for (index, row) in rows.iter().enumerate() {
        let r = index as u32 + 1;
        let group = &row.group;
        sheet.write(r, 0, group.clinic.as_str())?;
        sheet.write(r, 1, group.provider_id.as_str())?;
        sheet.write(r, 2, group.provider_name.as_str())?;
        sheet.write(r, 3, group.service_location.as_str())?;
        sheet.write_with_format(r, 4, group.direct_hours, &formats.hours)?;
        sheet.write_with_format(r, 5, group.supervision_hours, &formats.hours)?;
        sheet.write_with_format(r, SUPERVISION_PCT_COL, group.supervision_pct, &formats.percent)?;
        sheet.write_with_format(r, 7, row.certification_hours, &formats.hours)?;
        sheet.write(r, CERTIFICATION_MATCHED_COL, matched_label(row.certification_matched))?;
        sheet.write_with_format(r, 9, row.combined_supervised_hours, &formats.hours)?;
        sheet.write_with_format(r, COMBINED_PCT_COL, row.combined_pct, &formats.percent)?;
        sheet.write(r, 11, row.compliance.label())?;
    }
    Ok(())
}

fn matched_label(matched: bool) -> &'static str {
    if matched {
        "Yes"
    } else {
        "No"
    }
}

fn highlight_out_of_range(
    sheet: &mut Worksheet,
    row_count: u32,
    compliance: &ComplianceRange,
    formats: &Formats,
) -> Result<(), XlsxError> {
    if row_count == 0 {
        return Ok(());
    }

    let below = ConditionalFormatCell::new()
        .set_rule(ConditionalFormatCellRule::LessThan(compliance.minimum))
        .set_format(&formats.below);
    let above = compliance.maximum.map(|maximum| {
        ConditionalFormatCell::new()
            .set_rule(ConditionalFormatCellRule::GreaterThan(maximum))
            .set_format(&formats.above)
    });

    for col in [SUPERVISION_PCT_COL, COMBINED_PCT_COL] {
        sheet.add_conditional_format(1, col, row_count, col, &below)?;
        if let Some(above) = &above {
            sheet.add_conditional_format(1, col, row_count, col, above)?;
        }
    }
    Ok(())
}

/// Spreadsheet-safe sheet name, unique within the workbook.
pub(crate) fn unique_sheet_name(clinic: &str, used: &mut HashSet<String>) -> String {
    let base = sanitize_sheet_name(clinic);
    let mut candidate = base.clone();
    let mut suffix = 2;
    while !used.insert(candidate.to_lowercase()) {
        let tag = format!(" ({suffix})");
        let keep = MAX_SHEET_NAME.saturating_sub(tag.chars().count());
        candidate = format!("{}{}", base.chars().take(keep).collect::<String>(), tag);
        suffix += 1;
    }
    candidate
}

fn sanitize_sheet_name(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| match c {
            '[' | ']' | ':' | '*' | '?' | '/' | '\\' => '-',
            c if c.is_control() => ' ',
            c => c,
        })
        .collect();
    let trimmed = cleaned.trim().trim_matches('\'').trim();
    let truncated: String = trimmed.chars().take(MAX_SHEET_NAME).collect();
    let truncated = truncated.trim_end().to_string();

    if truncated.is_empty() {
        "Clinic".to_string()
    } else if truncated.eq_ignore_ascii_case("history") {
        "History Clinic".to_string()
    } else {
        truncated
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::supervision::domain::{ComplianceStatus, ProviderLocationGroup};

    fn row(clinic: &str, provider: &str, pct: f64) -> MergedRow {
        MergedRow {
            group: ProviderLocationGroup {
                clinic: clinic.to_string(),
                provider_id: provider.to_string(),
                provider_name: format!("Provider {provider}"),
                service_location: format!("ORGANIZATION: {clinic} Clinic"),
                direct_hours: 10.0,
                supervision_hours: 1.0,
                supervision_pct: 0.0909,
            },
            certification_hours: 0.0,
            certification_matched: false,
            combined_supervised_hours: 1.0,
            combined_pct: pct,
            compliance: ComplianceStatus::WithinRange,
        }
    }

    #[test]
    fn sheet_names_follow_spreadsheet_rules() {
        let mut used = HashSet::new();
        assert_eq!(unique_sheet_name("Austin: North/South", &mut used), "Austin- North-South");
        assert_eq!(unique_sheet_name("", &mut used), "Clinic");
        assert_eq!(unique_sheet_name("History", &mut used), "History Clinic");

        let long = "A very long clinic name that keeps going";
        let first = unique_sheet_name(long, &mut used);
        let second = unique_sheet_name(long, &mut used);
        assert_eq!(first.chars().count(), 31);
        assert!(second.ends_with(" (2)"));
        assert!(second.chars().count() <= 31);
        assert_ne!(first, second);
    }

    #[test]
    fn writes_one_sheet_per_clinic() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("report.xlsx");
        let rows = vec![
            row("Round Rock", "b", 0.02),
            row("Austin", "a", 0.2),
            row("Austin", "c", 0.3),
        ];

        let sheets = write_report(&rows, &ComplianceRange::default(), &path).expect("workbook");
        assert_eq!(sheets, vec!["Austin".to_string(), "Round Rock".to_string()]);
        assert!(path.metadata().expect("file written").len() > 0);
    }

    #[test]
    fn certification_match_has_its_own_column() {
        assert_eq!(
            HEADERS[CERTIFICATION_MATCHED_COL as usize].0,
            "Certification Matched"
        );
        assert_eq!(HEADERS[COMBINED_PCT_COL as usize].0, "Combined %");
        assert_eq!(HEADERS[SUPERVISION_PCT_COL as usize].0, "Supervision %");
        assert_eq!(matched_label(true), "Yes");
        assert_eq!(matched_label(false), "No");

        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("matched.xlsx");
        let mut matched = row("Austin", "a", 0.2);
        matched.certification_matched = true;
        matched.certification_hours = 3.0;
        let rows = vec![matched, row("Austin", "b", 0.1)];
        write_report(&rows, &ComplianceRange::default(), &path).expect("workbook");
        assert!(path.exists());
    }

    #[test]
    fn empty_report_still_has_a_sheet() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("empty.xlsx");
        let compliance = ComplianceRange {
            minimum: 0.05,
            maximum: Some(0.5),
        };
        let sheets = write_report(&[], &compliance, &path).expect("workbook");
        assert_eq!(sheets, vec![EMPTY_SHEET.to_string()]);
    }
}
