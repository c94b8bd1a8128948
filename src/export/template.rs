use regex::{Captures, Regex};
use std::collections::HashMap;
use std::sync::LazyLock;

/// Page size of the certificate: A4 portrait at 96 dpi.
pub const PAGE_WIDTH_PX: u32 = 794;
pub const PAGE_HEIGHT_PX: u32 = 1123;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{([A-Za-z0-9_]+)\}\}").expect("Failed to compile placeholder regex")
});

pub struct TemplateEngine;

impl TemplateEngine {
    /// Substitutes `{{key}}` placeholders in one left-to-right pass.
    ///
    /// Substituted values are never rescanned, so braces inside record data come through
    /// verbatim. Placeholders without a value are left as they are.
    pub fn render(template: &str, variables: &HashMap<String, String>) -> String {
        PLACEHOLDER
            .replace_all(template, |caps: &Captures| match variables.get(&caps[1]) {
                Some(value) => value.clone(),
                None => caps[0].to_string(),
            })
            .into_owned()
    }

    /// Placeholder names used by a template, in order of appearance.
    pub fn placeholders(template: &str) -> Vec<String> {
        PLACEHOLDER
            .captures_iter(template)
            .map(|caps| caps[1].to_string())
            .collect()
    }

    /// Placeholders of `template` that `variables` has no value for, deduplicated.
    pub fn unresolved(template: &str, variables: &HashMap<String, String>) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for name in Self::placeholders(template) {
            if !variables.contains_key(&name) && !names.contains(&name) {
                names.push(name);
            }
        }
        names
    }
}

/// Escape text for use inside SVG/XML character data and attribute values.
pub fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c if (c as u32) < 0x20 && c != '\t' && c != '\n' && c != '\r' => {}
            c => out.push(c),
        }
    }
    out
}

/// Built-in training completion certificate.
pub const CERTIFICATE_TEMPLATE: &str = r##"<svg xmlns="http://www.w3.org/2000/svg" width="794" height="1123" viewBox="0 0 794 1123">
  <rect x="0" y="0" width="794" height="1123" fill="#fff9f9"/>
  <rect x="24" y="24" width="746" height="1075" fill="none" stroke="#8B0000" stroke-width="3"/>
  <g font-family="Times New Roman, serif" text-anchor="middle" fill="#000000">
    <text x="397" y="96" font-size="24" font-weight="bold" fill="#8B0000" text-decoration="underline">BALAJI SHIKSHAN SANSTHAN SAMITI</text>
    <text x="397" y="132" font-size="20" font-weight="bold">25 Hrs Training Completion Certificate (Online)</text>
    <text x="397" y="200" font-size="18">This is to certify that</text>
    <text x="397" y="246" font-size="22" font-weight="bold" text-decoration="underline">{{name}}</text>
    <text x="397" y="292" font-size="18">has successfully completed twenty-five hours training</text>
    <text x="397" y="319" font-size="18">through the online mode by</text>
    <text x="397" y="356" font-size="18" font-weight="bold">Balaji Shikshan Sansthan Samiti,</text>
    <text x="397" y="381" font-size="18" font-weight="bold">using the portal www.balajitraining.in</text>
    <text x="397" y="418" font-size="18">for Life Insurance from</text>
    <text x="397" y="450" font-size="18" font-weight="bold">{{start_date}} to {{end_date}}</text>
    <text x="397" y="500" font-size="18"><tspan font-weight="bold">Branch:</tspan> {{branch}}</text>
    <text x="397" y="528" font-size="18"><tspan font-weight="bold">LIC Registration No:</tspan> {{lic_regd_number}}</text>
    <text x="397" y="580" font-size="18">The Candidate is sponsored/forwarded by:</text>
    <text x="397" y="612" font-size="20" font-weight="bold">LIC OF INDIA</text>
  </g>
  <g font-family="Times New Roman, serif" font-size="16" fill="#000000">
    <text x="70" y="672">Balaji Shikshan Sansthan Samiti is an Accredited Institute for Life Insurance Agent's</text>
    <text x="70" y="696">Training by Life Insurance Corporation of India by</text>
    <text x="70" y="726" font-weight="bold">Reference Number CO/MKTG/FFT/PRT.</text>
    <text x="70" y="752">This Approval is Valid Up to 30 June 2027.</text>
    <text x="70" y="800" font-weight="bold">PAN NUMBER:</text>
    <text x="70" y="822" font-weight="bold">{{pan}}</text>
    <text x="320" y="800" font-weight="bold">CERTIFICATE REF.:</text>
    <text x="320" y="822" font-weight="bold">{{certificate_ref}}</text>
    <text x="570" y="800" font-weight="bold">SR. NO.:</text>
    <text x="570" y="822" font-weight="bold">{{sr_no}}</text>
    <line x1="100" y1="940" x2="300" y2="940" stroke="#000000" stroke-width="1"/>
    <text x="200" y="962" text-anchor="middle">RENHA KOHLI</text>
    <text x="594" y="962" text-anchor="middle">Official Stamp</text>
    <text x="397" y="1012" font-size="14" text-anchor="middle">You can verify training details at:</text>
    <text x="397" y="1032" font-size="14" text-anchor="middle">https://balajitraining.in/verify-certificate/</text>
    <text x="397" y="1068" font-size="12" text-anchor="middle">Regd. Office: 523, MAKSH2001/48 Plaza, 9F Post, Manmanur, Jaipur - 300020 (Raj)</text>
  </g>
</svg>
"##;
