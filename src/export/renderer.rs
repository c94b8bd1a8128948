use chrono::NaiveDate;
use log::debug;
use std::collections::HashMap;
use std::fmt::Write;

use super::error::RenderFault;
use super::surface::{CertificateDocument, RenderSurface};
use super::template::{
    CERTIFICATE_TEMPLATE, PAGE_HEIGHT_PX, PAGE_WIDTH_PX, TemplateEngine, escape_xml,
};
use crate::record::StudentRecord;

pub const DEFAULT_DATE_FORMAT: &str = "%d-%m-%Y";

/// Lays out one certificate on a surface.
///
/// `render` returns only once the document is fully mounted; the caller may rasterize
/// the surface immediately afterwards. Prior surface contents are always replaced.
pub trait TemplateRenderer: Send + Sync {
    fn render(&self, surface: &mut RenderSurface, record: &StudentRecord)
    -> Result<(), RenderFault>;
}

/// Renders certificates by substituting record fields into an SVG template.
pub struct SvgCertificateRenderer {
    template: String,
    date_format: String,
}

impl Default for SvgCertificateRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl SvgCertificateRenderer {
    pub fn new() -> Self {
        Self {
            template: CERTIFICATE_TEMPLATE.to_string(),
            date_format: DEFAULT_DATE_FORMAT.to_string(),
        }
    }

    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = template.into();
        self
    }

    pub fn with_date_format(mut self, format: impl Into<String>) -> Self {
        self.date_format = format.into();
        self
    }

    fn format_date(&self, date: NaiveDate) -> Result<String, RenderFault> {
        let mut out = String::new();
        write!(out, "{}", date.format(&self.date_format)).map_err(|_| {
            RenderFault::Template(format!("invalid date format '{}'", self.date_format))
        })?;
        Ok(out)
    }

    fn variables(&self, record: &StudentRecord) -> Result<HashMap<String, String>, RenderFault> {
        let start = self.format_date(record.start_date)?;
        let end = self.format_date(record.end_date)?;

        let mut vars = HashMap::new();
        let mut put = |key: &str, value: &str| {
            vars.insert(key.to_string(), escape_xml(value));
        };
        put("name", &record.name.trim().to_uppercase());
        put("pan", record.pan_number.trim());
        put("start_date", &start);
        put("end_date", &end);
        put("branch", &record.branch);
        put("lic_regd_number", &record.lic_regd_number);
        put("certificate_ref", &record.certificate_ref());
        put("sr_no", &record.sr_no.to_string());
        Ok(vars)
    }
}

impl TemplateRenderer for SvgCertificateRenderer {
    fn render(
        &self,
        surface: &mut RenderSurface,
        record: &StudentRecord,
    ) -> Result<(), RenderFault> {
        // Never leave the previous certificate mounted if this one fails.
        surface.clear();

        if record.name.trim().is_empty() {
            return Err(RenderFault::MissingField("name"));
        }
        if record.pan_number.trim().is_empty() {
            return Err(RenderFault::MissingField("panNumber"));
        }

        let vars = self.variables(record)?;
        let unresolved = TemplateEngine::unresolved(&self.template, &vars);
        if !unresolved.is_empty() {
            return Err(RenderFault::Template(format!(
                "unknown placeholders: {}",
                unresolved.join(", ")
            )));
        }
        let markup = TemplateEngine::render(&self.template, &vars);

        debug!(
            "Rendered certificate for {} on surface {}",
            record.identifier(),
            surface.id()
        );
        surface.mount(CertificateDocument {
            label: record.display_name().to_string(),
            markup,
            width: PAGE_WIDTH_PX,
            height: PAGE_HEIGHT_PX,
        });
        Ok(())
    }
}
