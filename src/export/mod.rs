//! Serializes one category job's dataset into an `.xlsx` artifact: one
//! worksheet per category, header row plus one row per listing.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use rust_xlsxwriter::{Format, Workbook, Worksheet};
use tracing::debug;

use crate::models::{CategoryDataset, Listing};

/// Sink for a completed category job's dataset. Failures are loud and
/// non-retryable; the artifact is then treated as never produced.
pub trait ExportWriter: Send + Sync {
    fn write(&self, path: &Path, dataset: &CategoryDataset) -> Result<()>;
}

/// Excel caps worksheet names at 31 characters.
const SHEET_NAME_MAX: usize = 31;

const COLUMNS: &[&str] = &[
    "Ad ID",
    "Title",
    "Category",
    "Published At",
    "Relative Time",
    "Pinned",
    "Price",
    "Address",
    "Views",
    "Phone",
    "Submitter",
    "Submitter Ads",
    "Member Since",
    "Link",
    "Image",
    "Description",
    "Additional Details",
    "Specifications",
];

pub struct XlsxExporter;

impl ExportWriter for XlsxExporter {
    fn write(&self, path: &Path, dataset: &CategoryDataset) -> Result<()> {
        let mut workbook = Workbook::new();
        let mut used_names = HashSet::new();
        let header_format = Format::new().set_bold();

        for (category, listings) in dataset.iter() {
            if listings.is_empty() {
                continue;
            }
            let worksheet = workbook.add_worksheet();
            worksheet
                .set_name(sheet_name(&mut used_names, category))
                .context("invalid worksheet name")?;
            for (col, header) in COLUMNS.iter().enumerate() {
                worksheet.write_string_with_format(0, col as u16, *header, &header_format)?;
            }
            for (row, listing) in listings.iter().enumerate() {
                write_row(worksheet, row as u32 + 1, listing)?;
            }
            debug!(category = %category, rows = listings.len(), "worksheet written");
        }

        workbook
            .save(path)
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(())
    }
}

fn write_row(worksheet: &mut Worksheet, row: u32, listing: &Listing) -> Result<()> {
    let published = listing
        .published_at
        .map(|ts| ts.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_default();
    // Deterministic cell contents regardless of hash order.
    let mut spec_pairs: Vec<(&String, &String)> = listing.specifications.iter().collect();
    spec_pairs.sort();
    let specifications = spec_pairs
        .into_iter()
        .map(|(label, value)| format!("{label}: {value}"))
        .collect::<Vec<_>>()
        .join("; ");

    worksheet.write_string(row, 0, listing.id.as_deref().unwrap_or_default())?;
    worksheet.write_string(row, 1, listing.title.as_deref().unwrap_or_default())?;
    worksheet.write_string(row, 2, &listing.category)?;
    worksheet.write_string(row, 3, &published)?;
    worksheet.write_string(row, 4, listing.relative_time.as_deref().unwrap_or_default())?;
    worksheet.write_boolean(row, 5, listing.pinned)?;
    worksheet.write_string(row, 6, &listing.price)?;
    worksheet.write_string(row, 7, &listing.address)?;
    worksheet.write_string(row, 8, listing.views.as_deref().unwrap_or_default())?;
    worksheet.write_string(row, 9, listing.phone.as_deref().unwrap_or_default())?;
    worksheet.write_string(row, 10, listing.submitter.name.as_deref().unwrap_or_default())?;
    worksheet.write_string(row, 11, &listing.submitter.ads)?;
    worksheet.write_string(row, 12, listing.submitter.member_since.as_deref().unwrap_or_default())?;
    worksheet.write_string(row, 13, &listing.link)?;
    worksheet.write_string(row, 14, listing.image_url.as_deref().unwrap_or_default())?;
    worksheet.write_string(row, 15, &listing.description)?;
    worksheet.write_string(row, 16, &listing.additional_details.join("; "))?;
    worksheet.write_string(row, 17, &specifications)?;
    Ok(())
}

/// Sanitize and truncate a category name into a legal, unique worksheet name.
/// Truncation can make two categories collide; those get a `~n` suffix
/// instead of silently overwriting each other.
fn sheet_name(used: &mut HashSet<String>, raw: &str) -> String {
    let sanitized: String = raw
        .chars()
        .map(|c| match c {
            '[' | ']' | ':' | '*' | '?' | '/' | '\\' => ' ',
            other => other,
        })
        .collect();
    let sanitized = sanitized.trim().to_string();
    let base: String = sanitized.chars().take(SHEET_NAME_MAX).collect();
    let mut name = if base.is_empty() { "unknown".to_string() } else { base };

    let mut n = 2;
    while !used.insert(name.clone()) {
        let prefix: String = sanitized.chars().take(SHEET_NAME_MAX - 4).collect();
        name = format!("{}~{}", prefix.trim_end(), n);
        n += 1;
    }
    name
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Listing;
    use crate::scrapers::types::RawListing;

    fn listing(category: &str) -> Listing {
        Listing::from_raw(
            RawListing {
                id: Some("1".to_string()),
                category: Some(category.to_string()),
                title: Some("Camry".to_string()),
                link: "https://example.com/ad".to_string(),
                ..RawListing::default()
            },
            None,
        )
    }

    #[test]
    fn short_names_pass_through() {
        let mut used = HashSet::new();
        assert_eq!(sheet_name(&mut used, "Toyota"), "Toyota");
    }

    #[test]
    fn long_names_are_truncated_to_the_excel_limit() {
        let mut used = HashSet::new();
        let name = sheet_name(&mut used, "Special Needs Vehicles And Accessories");
        assert_eq!(name.chars().count(), SHEET_NAME_MAX);
    }

    #[test]
    fn truncation_collisions_are_disambiguated() {
        let mut used = HashSet::new();
        let long_a = "Very Long Category Name That Overflows A";
        let long_b = "Very Long Category Name That Overflows B";
        let a = sheet_name(&mut used, long_a);
        let b = sheet_name(&mut used, long_b);
        assert_ne!(a, b);
        assert!(b.chars().count() <= SHEET_NAME_MAX);
        assert!(b.contains('~'));
    }

    #[test]
    fn forbidden_characters_are_replaced() {
        let mut used = HashSet::new();
        let name = sheet_name(&mut used, "Cars/Trucks: 4x4?");
        assert!(!name.contains('/') && !name.contains(':') && !name.contains('?'));
    }

    #[test]
    fn writes_one_sheet_per_category() {
        let mut dataset = CategoryDataset::new();
        dataset.push(listing("Toyota"));
        dataset.push(listing("Lexus"));

        let dir = std::env::temp_dir().join(format!("souq-scout-export-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("Toyota_20260310.xlsx");

        XlsxExporter.write(&path, &dataset).unwrap();
        let metadata = std::fs::metadata(&path).unwrap();
        assert!(metadata.len() > 0);

        std::fs::remove_dir_all(&dir).ok();
    }
}
