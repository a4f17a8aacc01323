//! Workbook descriptor: sheet names and where their worksheets live.

use serde::Deserialize;

use crate::error::{Result, XlimagesError};
use crate::namespaces::is_worksheet_relationship;
use crate::package::Package;
use crate::types::Sheet;
use crate::xml_map::XmlMapper;

use super::relationships::{part_dir, read_relationships, RelationshipTable};

#[derive(Debug, Deserialize)]
struct WorkbookDocument {
    workbook: WorkbookRecord,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WorkbookRecord {
    sheets: SheetsRecord,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SheetsRecord {
    sheet: Vec<SheetRecord>,
}

#[derive(Debug, Deserialize)]
struct SheetRecord {
    name: String,
    #[serde(rename = "sheetId")]
    sheet_id: String,
    /// `r:id` linking to the workbook relationships
    #[serde(default)]
    id: Option<String>,
}

/// Sheet name → [`Sheet`], in the workbook's declared order.
///
/// Built once per resolution pass and read-only afterwards.
#[derive(Debug, Clone, Default)]
pub struct SheetRegistry {
    sheets: Vec<Sheet>,
}

impl SheetRegistry {
    /// Build the registry from the package's workbook descriptor.
    ///
    /// Worksheet paths come from the workbook relationships when the sheet's
    /// `r:id` resolves there, and otherwise from the conventional
    /// `worksheets/sheet<sheetId>.xml` next to the workbook part.
    ///
    /// # Errors
    /// Returns [`XlimagesError::SheetRegistry`] if the workbook part is missing
    /// or cannot be read.
    pub fn build(package: &Package, mapper: &XmlMapper, workbook_part: &str) -> Result<Self> {
        let xml = package
            .part_text(workbook_part)
            .map_err(|e| registry_error("workbook part is unreadable", e))?
            .ok_or_else(|| XlimagesError::SheetRegistry {
                reason: format!("workbook part {workbook_part} not found"),
                source: None,
            })?;

        let relationships = read_relationships(package, mapper, workbook_part)
            .map_err(|e| registry_error("workbook relationships are unreadable", e))?;

        Self::from_workbook_xml(mapper, workbook_part, &xml, relationships.as_ref())
    }

    /// Build the registry from workbook XML already in hand.
    ///
    /// # Errors
    /// Returns [`XlimagesError::SheetRegistry`] if the XML is malformed.
    pub fn from_workbook_xml(
        mapper: &XmlMapper,
        workbook_part: &str,
        xml: &str,
        relationships: Option<&RelationshipTable>,
    ) -> Result<Self> {
        let document: WorkbookDocument = mapper
            .map_as(workbook_part, xml)
            .map_err(|e| registry_error("workbook part is malformed", e))?;

        let workbook_dir = part_dir(workbook_part);
        let sheets = document
            .workbook
            .sheets
            .sheet
            .into_iter()
            .map(|record| {
                // A declared relationship wins whatever it targets, chartsheets included.
                let path = record
                    .id
                    .as_deref()
                    .and_then(|rel_id| relationships?.get(rel_id))
                    .map(|rel| {
                        if !is_worksheet_relationship(&rel.rel_type) {
                            log::debug!(
                                "sheet {:?} targets a non-worksheet part {}",
                                record.name,
                                rel.target
                            );
                        }
                        rel.target.clone()
                    })
                    .unwrap_or_else(|| conventional_sheet_path(workbook_dir, &record.sheet_id));
                Sheet {
                    id: record.sheet_id,
                    name: record.name,
                    path,
                }
            })
            .collect::<Vec<_>>();

        log::debug!("sheet registry: {} sheets in {workbook_part}", sheets.len());
        Ok(Self { sheets })
    }

    /// Look up a sheet by its user-visible name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Sheet> {
        self.sheets.iter().find(|sheet| sheet.name == name)
    }

    /// Sheets in declared order.
    #[must_use]
    pub fn sheets(&self) -> &[Sheet] {
        &self.sheets
    }

    /// Sheet names in declared order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.sheets.iter().map(|sheet| sheet.name.as_str())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sheets.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sheets.is_empty()
    }
}

/// Path of the shared strings part, from the workbook relationships when
/// declared there.
///
/// # Errors
/// Returns an error if the workbook relationships are malformed.
pub fn shared_strings_part(
    package: &Package,
    mapper: &XmlMapper,
    workbook_part: &str,
) -> Result<String> {
    let declared = read_relationships(package, mapper, workbook_part)?.and_then(|table| {
        table
            .iter()
            .find(|rel| rel.rel_type.ends_with("/sharedStrings") && !rel.external)
            .map(|rel| rel.target.clone())
    });

    Ok(declared.unwrap_or_else(|| {
        let dir = part_dir(workbook_part);
        if dir.is_empty() {
            "sharedStrings.xml".to_string()
        } else {
            format!("{dir}/sharedStrings.xml")
        }
    }))
}

fn conventional_sheet_path(workbook_dir: &str, sheet_id: &str) -> String {
    if workbook_dir.is_empty() {
        format!("worksheets/sheet{sheet_id}.xml")
    } else {
        format!("{workbook_dir}/worksheets/sheet{sheet_id}.xml")
    }
}

fn registry_error(reason: &str, source: XlimagesError) -> XlimagesError {
    XlimagesError::SheetRegistry {
        reason: reason.to_string(),
        source: Some(Box::new(source)),
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic
)]
mod tests {
    use super::*;

    const WORKBOOK_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">
  <sheets>
    <sheet name="Data" sheetId="1" r:id="rId1"/>
    <sheet name="Summary &amp; Notes" sheetId="4" r:id="rId2"/>
  </sheets>
</workbook>"#;

    const WORKBOOK_RELS_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
  <Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/>
  <Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/summary.xml"/>
  <Relationship Id="rId3" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/sharedStrings" Target="strings/shared.xml"/>
</Relationships>"#;

    #[test]
    fn test_build_uses_workbook_relationships() {
        let mut package = Package::in_memory();
        package.insert_part("xl/workbook.xml", WORKBOOK_XML);
        package.insert_part("xl/_rels/workbook.xml.rels", WORKBOOK_RELS_XML);

        let registry =
            SheetRegistry::build(&package, &XmlMapper::default(), "xl/workbook.xml").unwrap();

        assert_eq!(registry.len(), 2);
        assert_eq!(
            registry.names().collect::<Vec<_>>(),
            vec!["Data", "Summary & Notes"]
        );
        let summary = registry.get("Summary & Notes").unwrap();
        assert_eq!(summary.id, "4");
        assert_eq!(summary.path, "xl/worksheets/summary.xml");
        assert!(registry.get("Missing").is_none());
    }

    #[test]
    fn test_build_falls_back_to_sheet_id_paths() {
        let mut package = Package::in_memory();
        package.insert_part("xl/workbook.xml", WORKBOOK_XML);

        let registry =
            SheetRegistry::build(&package, &XmlMapper::default(), "xl/workbook.xml").unwrap();

        assert_eq!(registry.get("Data").unwrap().path, "xl/worksheets/sheet1.xml");
        assert_eq!(
            registry.get("Summary & Notes").unwrap().path,
            "xl/worksheets/sheet4.xml"
        );
    }

    #[test]
    fn test_chartsheet_keeps_its_own_path() {
        let workbook = r#"<workbook xmlns:r="urn:r"><sheets>
            <sheet name="Data" sheetId="1" r:id="rId1"/>
            <sheet name="Chart1" sheetId="2" r:id="rId2"/>
            <sheet name="Pics" sheetId="3" r:id="rId3"/>
        </sheets></workbook>"#;
        let rels = r#"<Relationships>
            <Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/>
            <Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/chartsheet" Target="chartsheets/sheet1.xml"/>
            <Relationship Id="rId3" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet2.xml"/>
        </Relationships>"#;
        let mut package = Package::in_memory();
        package.insert_part("xl/workbook.xml", workbook);
        package.insert_part("xl/_rels/workbook.xml.rels", rels);

        let registry =
            SheetRegistry::build(&package, &XmlMapper::default(), "xl/workbook.xml").unwrap();

        assert_eq!(registry.get("Data").unwrap().path, "xl/worksheets/sheet1.xml");
        assert_eq!(registry.get("Chart1").unwrap().path, "xl/chartsheets/sheet1.xml");
        assert_eq!(registry.get("Pics").unwrap().path, "xl/worksheets/sheet2.xml");
    }

    #[test]
    fn test_unknown_relationship_id_falls_back_to_sheet_id() {
        let mut package = Package::in_memory();
        package.insert_part(
            "xl/workbook.xml",
            r#"<workbook xmlns:r="urn:r"><sheets><sheet name="Lost" sheetId="5" r:id="rId9"/></sheets></workbook>"#,
        );
        package.insert_part("xl/_rels/workbook.xml.rels", WORKBOOK_RELS_XML);

        let registry =
            SheetRegistry::build(&package, &XmlMapper::default(), "xl/workbook.xml").unwrap();

        assert_eq!(registry.get("Lost").unwrap().path, "xl/worksheets/sheet5.xml");
    }

    #[test]
    fn test_single_sheet_is_a_list() {
        let xml = r#"<workbook><sheets><sheet name="Only" sheetId="9"/></sheets></workbook>"#;
        let registry =
            SheetRegistry::from_workbook_xml(&XmlMapper::default(), "xl/workbook.xml", xml, None)
                .unwrap();
        assert_eq!(registry.sheets().len(), 1);
        assert_eq!(registry.sheets()[0].path, "xl/worksheets/sheet9.xml");
    }

    #[test]
    fn test_missing_workbook_part() {
        let package = Package::in_memory();
        let err =
            SheetRegistry::build(&package, &XmlMapper::default(), "xl/workbook.xml").unwrap_err();
        assert!(matches!(err, XlimagesError::SheetRegistry { source: None, .. }));
    }

    #[test]
    fn test_malformed_workbook_part() {
        let mut package = Package::in_memory();
        package.insert_part("xl/workbook.xml", "<workbook><sheets></workbook>");
        let err =
            SheetRegistry::build(&package, &XmlMapper::default(), "xl/workbook.xml").unwrap_err();
        match err {
            XlimagesError::SheetRegistry {
                source: Some(source),
                ..
            } => assert!(matches!(*source, XlimagesError::XmlParse { .. })),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_shared_strings_part() {
        let mapper = XmlMapper::default();
        let mut package = Package::in_memory();
        assert_eq!(
            shared_strings_part(&package, &mapper, "xl/workbook.xml").unwrap(),
            "xl/sharedStrings.xml"
        );

        package.insert_part("xl/_rels/workbook.xml.rels", WORKBOOK_RELS_XML);
        assert_eq!(
            shared_strings_part(&package, &mapper, "xl/workbook.xml").unwrap(),
            "xl/strings/shared.xml"
        );
    }
}
