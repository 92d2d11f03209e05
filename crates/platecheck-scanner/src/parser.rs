use crate::error::{LookupError, Result};
use crate::normalize::{normalize_label, normalize_multiline};
use platecheck_core::{ResultDetails, Violation};
use scraper::{ElementRef, Html, Selector};

const BODY_SELECTOR: &str = "#bodyPrint123";
const GROUP_SELECTOR: &str = "#bodyPrint123 .form-group";
const LABEL_SELECTOR: &str = ".col-md-3";
const VALUE_SELECTOR: &str = ".col-md-9";
const ERROR_SELECTOR: &str = ".xe_texterror";

/// Text that opens a violation block in the page's raw text.
const RECORD_MARKERS: [&str; 2] = ["Biển kiểm soát:", "License plate:"];
/// Text that opens the resolution section inside a block.
const RESOLUTION_HEADERS: [&str; 2] = ["Nơi giải quyết vụ việc:", "Resolution point:"];
/// Prefix of an address line inside the resolution section.
const ADDRESS_MARKERS: [&str; 2] = ["Địa chỉ:", "Address:"];

pub const ADDRESS_SEPARATOR: &str = " | ";

/// Result page fields, keyed by their normalized label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    LicensePlate,
    PlateColor,
    VehicleType,
    ViolationTime,
    Location,
    Behavior,
    Status,
    DetectingUnit,
    ResolutionPoint,
}

impl Field {
    fn from_key(key: &str) -> Option<Self> {
        let field = match key {
            "bien kiem soat" => Self::LicensePlate,
            "mau bien" => Self::PlateColor,
            "loai phuong tien" => Self::VehicleType,
            "thoi gian vi pham" => Self::ViolationTime,
            "dia diem vi pham" => Self::Location,
            "hanh vi vi pham" => Self::Behavior,
            "trang thai" => Self::Status,
            "don vi phat hien vi pham" => Self::DetectingUnit,
            "noi giai quyet vu viec" => Self::ResolutionPoint,
            _ => return None,
        };
        Some(field)
    }

    fn slot(self, violation: &mut Violation) -> &mut String {
        match self {
            Self::LicensePlate => &mut violation.license_plate,
            Self::PlateColor => &mut violation.plate_color,
            Self::VehicleType => &mut violation.vehicle_type,
            Self::ViolationTime => &mut violation.violation_time,
            Self::Location => &mut violation.location,
            Self::Behavior => &mut violation.behavior,
            Self::Status => &mut violation.status,
            Self::DetectingUnit => &mut violation.detecting_unit,
            Self::ResolutionPoint => &mut violation.resolution_point,
        }
    }
}

/// Groups the flat label/value rows into records.
///
/// A plate row opens a new record. Rows before the first plate row belong
/// to no record and are dropped, so there is one record per plate row.
#[derive(Default)]
struct RecordAccumulator {
    records: Vec<Violation>,
    current: Option<Violation>,
}

impl RecordAccumulator {
    fn push(&mut self, field: Field, value: String) {
        if field == Field::LicensePlate {
            self.commit();
            self.current = Some(Violation::default());
        }
        match &mut self.current {
            Some(current) => *field.slot(current) = value,
            None => tracing::trace!(value = %value, "dropping field before first plate row"),
        }
    }

    fn commit(&mut self) {
        if let Some(record) = self.current.take() {
            self.records.push(record);
        }
    }

    fn finish(mut self) -> Vec<Violation> {
        self.commit();
        self.records
    }
}

/// Parses the lookup result page.
pub struct ResultExtractor {
    body: Selector,
    group: Selector,
    label: Selector,
    value: Selector,
    error_region: Selector,
}

impl ResultExtractor {
    pub fn new() -> Result<Self> {
        Ok(Self {
            body: parse_selector(BODY_SELECTOR)?,
            group: parse_selector(GROUP_SELECTOR)?,
            label: parse_selector(LABEL_SELECTOR)?,
            value: parse_selector(VALUE_SELECTOR)?,
            error_region: parse_selector(ERROR_SELECTOR)?,
        })
    }

    /// Extract violation records, or a plain-text notice when there are none.
    ///
    /// The returned details may be empty; see [`ResultDetails::is_empty`].
    #[must_use]
    pub fn extract(&self, html: &str) -> ResultDetails {
        let document = Html::parse_document(html);
        let body_text = self.body_text(&document);

        let mut violations = self.extract_violations(&document);
        if !violations.is_empty() {
            apply_resolution_points(&body_text, &mut violations);
            return ResultDetails {
                message: None,
                violations,
            };
        }

        let mut message = normalize_multiline(&body_text);
        if message.is_empty() {
            message = normalize_multiline(&select_text(&document.root_element(), &self.error_region));
        }

        ResultDetails {
            message: Some(message).filter(|m| !m.is_empty()),
            violations: Vec::new(),
        }
    }

    fn extract_violations(&self, document: &Html) -> Vec<Violation> {
        let mut acc = RecordAccumulator::default();

        for group in document.select(&self.group) {
            let label = normalize_label(&select_text(&group, &self.label));
            let value = normalize_multiline(&select_text(&group, &self.value));
            if label.is_empty() || value.is_empty() {
                continue;
            }

            match Field::from_key(&label) {
                Some(field) => acc.push(field, value),
                None => tracing::trace!(label = %label, "ignoring unknown result field"),
            }
        }

        acc.finish()
    }

    fn body_text(&self, document: &Html) -> String {
        document
            .select(&self.body)
            .flat_map(|el| el.text())
            .collect()
    }
}

fn parse_selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| LookupError::Parse(format!("invalid selector {css}: {e}")))
}

fn select_text(element: &ElementRef, selector: &Selector) -> String {
    element
        .select(selector)
        .flat_map(|el| el.text())
        .collect()
}

/// Overwrite each record's resolution point with the addresses found in its
/// block of the raw page text, matched by position.
///
/// Records whose block yields no address keep the inline value.
fn apply_resolution_points(full_text: &str, violations: &mut [Violation]) {
    for (violation, addresses) in violations.iter_mut().zip(resolution_points(full_text)) {
        if !addresses.is_empty() {
            violation.resolution_point = addresses;
        }
    }
}

/// Addresses per record block, joined with [`ADDRESS_SEPARATOR`].
fn resolution_points(full_text: &str) -> Vec<String> {
    record_blocks(full_text)
        .into_iter()
        .map(|block| {
            let section = RESOLUTION_HEADERS
                .iter()
                .find_map(|header| block.find(header).map(|idx| &block[idx + header.len()..]))
                .unwrap_or(block);
            extract_addresses(section)
        })
        .collect()
}

/// Split text into the pieces following each record marker.
fn record_blocks(text: &str) -> Vec<&str> {
    let mut cuts: Vec<(usize, usize)> = RECORD_MARKERS
        .iter()
        .flat_map(|marker| {
            text.match_indices(marker)
                .map(move |(idx, _)| (idx, idx + marker.len()))
        })
        .collect();
    cuts.sort_unstable();

    cuts.iter()
        .enumerate()
        .map(|(n, &(_, start))| {
            let end = cuts.get(n + 1).map_or(text.len(), |&(next, _)| next);
            &text[start..end]
        })
        .collect()
}

fn extract_addresses(section: &str) -> String {
    section
        .lines()
        .map(str::trim)
        .filter_map(|line| {
            ADDRESS_MARKERS
                .iter()
                .find_map(|marker| line.strip_prefix(marker))
                .map(str::trim)
        })
        .filter(|addr| !addr.is_empty())
        .collect::<Vec<_>>()
        .join(ADDRESS_SEPARATOR)
}
