use log::debug;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// A fully laid-out certificate, as mounted on a [`RenderSurface`].
#[derive(Debug, Clone, PartialEq)]
pub struct CertificateDocument {
    /// Label of the record this document was produced from.
    pub label: String,
    /// SVG markup of the whole page.
    pub markup: String,
    /// Page size in CSS pixels.
    pub width: u32,
    pub height: u32,
}

/// Counts surfaces handed out and torn down, so callers can check nothing leaks.
#[derive(Clone, Debug, Default)]
pub struct SurfaceLedger {
    next_id: Arc<AtomicU64>,
    opened: Arc<AtomicUsize>,
    closed: Arc<AtomicUsize>,
}

impl SurfaceLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    /// Surfaces that were opened and not yet torn down.
    pub fn live(&self) -> usize {
        self.opened().saturating_sub(self.closed())
    }
}

/// Off-screen area where one certificate at a time is laid out before rasterization.
///
/// Exclusively owned by one export job. Mounting a document replaces whatever was there.
/// The surface is torn down exactly once: explicitly via [`RenderSurface::teardown`] or,
/// on any other exit path (including unwinding), when it is dropped.
#[derive(Debug)]
pub struct RenderSurface {
    id: u64,
    root: Option<CertificateDocument>,
    ledger: SurfaceLedger,
    torn_down: bool,
}

impl RenderSurface {
    pub fn open(ledger: &SurfaceLedger) -> Self {
        let id = ledger.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        ledger.opened.fetch_add(1, Ordering::SeqCst);
        debug!("Opened render surface {id}");
        Self {
            id,
            root: None,
            ledger: ledger.clone(),
            torn_down: false,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn mount(&mut self, document: CertificateDocument) {
        self.root = Some(document);
    }

    /// Drop the mounted document, leaving the surface empty for the next record.
    pub fn clear(&mut self) {
        self.root = None;
    }

    /// The currently mounted document, if rendering has completed.
    pub fn root(&self) -> Option<&CertificateDocument> {
        self.root.as_ref()
    }

    pub fn teardown(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if self.torn_down {
            return;
        }
        self.root = None;
        self.torn_down = true;
        self.ledger.closed.fetch_add(1, Ordering::SeqCst);
        debug!("Tore down render surface {}", self.id);
    }
}

impl Drop for RenderSurface {
    fn drop(&mut self) {
        self.release();
    }
}
