//! Fakes and fixtures shared by unit and integration tests.

use chrono::NaiveDate;
use flume::{Receiver, Sender};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crate::export::error::{RasterFault, RenderFault};
use crate::export::job::CancellationToken;
use crate::export::rasterizer::{RasterOptions, Rasterizer};
use crate::export::renderer::TemplateRenderer;
use crate::export::surface::{CertificateDocument, RenderSurface};
use crate::record::StudentRecord;

pub fn record(sr_no: u32, name: &str, pan: &str) -> StudentRecord {
    StudentRecord {
        sr_no,
        name: name.to_string(),
        pan_number: pan.to_string(),
        lic_regd_number: format!("LIC-{sr_no:05}"),
        branch: "Pune".to_string(),
        start_date: NaiveDate::from_ymd_opt(2024, 3, 4).unwrap(),
        end_date: NaiveDate::from_ymd_opt(2024, 3, 8).unwrap(),
    }
}

/// `n` valid records with distinct names and PANs, numbered from 1.
pub fn sample_records(n: usize) -> Vec<StudentRecord> {
    (1..=n as u32)
        .map(|i| record(i, &format!("Student {i}"), &format!("ABCDE{i:04}F")))
        .collect()
}

/// Holds a fake renderer inside `render` until the test opens it.
#[derive(Clone)]
pub struct Gate {
    entered_tx: Sender<()>,
    entered_rx: Receiver<()>,
    release_tx: Arc<Mutex<Option<Sender<()>>>>,
    release_rx: Receiver<()>,
}

impl Default for Gate {
    fn default() -> Self {
        Self::new()
    }
}

impl Gate {
    pub fn new() -> Self {
        let (entered_tx, entered_rx) = flume::unbounded();
        let (release_tx, release_rx) = flume::unbounded();
        Self {
            entered_tx,
            entered_rx,
            release_tx: Arc::new(Mutex::new(Some(release_tx))),
            release_rx,
        }
    }

    /// Wait until some caller is blocked on the gate.
    pub fn wait_entered(&self, timeout: Duration) -> bool {
        self.entered_rx.recv_timeout(timeout).is_ok()
    }

    /// Let every current and future caller through.
    pub fn open(&self) {
        self.release_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    fn pass(&self) {
        let _ = self.entered_tx.send(());
        // Returns once the sender is dropped by `open`.
        let _ = self.release_rx.recv();
    }
}

/// Renderer that mounts the PAN as markup. Mirrors the real renderer's field checks.
#[derive(Default)]
pub struct FakeRenderer {
    failing: HashSet<String>,
    gate: Option<Gate>,
}

impl FakeRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_for(mut self, pans: &[&str]) -> Self {
        self.failing.extend(pans.iter().map(|p| p.to_string()));
        self
    }

    pub fn gated(mut self, gate: Gate) -> Self {
        self.gate = Some(gate);
        self
    }
}

impl TemplateRenderer for FakeRenderer {
    fn render(
        &self,
        surface: &mut RenderSurface,
        record: &StudentRecord,
    ) -> Result<(), RenderFault> {
        surface.clear();
        if let Some(gate) = &self.gate {
            gate.pass();
        }
        if record.name.trim().is_empty() {
            return Err(RenderFault::MissingField("name"));
        }
        if record.pan_number.trim().is_empty() {
            return Err(RenderFault::MissingField("panNumber"));
        }
        if self.failing.contains(&record.pan_number) {
            return Err(RenderFault::Template("simulated template failure".to_string()));
        }
        surface.mount(CertificateDocument {
            label: record.display_name().to_string(),
            markup: record.pan_number.clone(),
            width: 794,
            height: 1123,
        });
        Ok(())
    }
}

/// Rasterizer that returns the mounted markup as bytes.
#[derive(Default)]
pub struct FakeRasterizer {
    failing: HashSet<String>,
    panicking: HashSet<String>,
    cancel_after: Option<(usize, CancellationToken)>,
    calls: AtomicUsize,
}

impl FakeRasterizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_for(mut self, pans: &[&str]) -> Self {
        self.failing.extend(pans.iter().map(|p| p.to_string()));
        self
    }

    pub fn panicking_for(mut self, pan: &str) -> Self {
        self.panicking.insert(pan.to_string());
        self
    }

    /// Trip `token` during the `calls`-th rasterization.
    pub fn cancel_after(mut self, calls: usize, token: CancellationToken) -> Self {
        self.cancel_after = Some((calls, token));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Rasterizer for FakeRasterizer {
    fn rasterize(
        &self,
        surface: &RenderSurface,
        options: &RasterOptions,
    ) -> Result<Vec<u8>, RasterFault> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some((after, token)) = &self.cancel_after {
            if call == *after {
                token.cancel();
            }
        }

        let document = surface.root().ok_or(RasterFault::NotRendered)?;
        let pan = document.markup.as_str();
        if self.panicking.contains(pan) {
            panic!("simulated rasterizer panic for {pan}");
        }
        if self.failing.contains(pan) {
            return Err(RasterFault::generic("simulated rasterizer failure"));
        }
        Ok(format!("{pan}.{}", options.format.extension()).into_bytes())
    }
}
