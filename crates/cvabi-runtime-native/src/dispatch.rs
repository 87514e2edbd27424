//! Assembling a [`ViolationView`] from raw parts and running it through a
//! gate.

use cvabi_descriptor::{Descriptor, Resolver, Validation, VendorRegistry};
use tracing::{debug, warn};

use crate::{
    DetectionMode, Dispatch, DispatchGate, EvaluationSemantic, TerminationReason,
    ViolationHandler, ViolationView,
};

/// One reported violation before decoding.
#[derive(Clone, Copy, Debug)]
pub struct Violation<'a> {
    /// `None` when the caller supplied no descriptor.
    pub descriptor: Option<&'a [u8]>,
    /// The static data blob. Must cover the descriptor's data size for every
    /// field to resolve; shorter blobs make the uncovered fields absent.
    pub data: &'a [u8],
    pub detection: DetectionMode,
    pub semantic: EvaluationSemantic,
    pub dynamic: Option<&'a [u8]>,
}

/// Decodes `violation` under `mode` and reports it through `gate`.
///
/// Under [`Validation::Hardened`] a descriptor that fails validation, or a
/// data blob whose address breaks the declared alignment, terminates with
/// [`TerminationReason::MalformedDescriptor`] without calling the handler.
/// Under [`Validation::Trusting`] an unparseable descriptor is treated as
/// absent.
pub fn dispatch<H>(
    gate: &DispatchGate,
    violation: Violation<'_>,
    mode: Validation,
    vendors: &VendorRegistry,
    handler: &H,
) -> Dispatch
where
    H: ViolationHandler + ?Sized,
{
    let resolver = match violation.descriptor {
        None => None,
        Some(bytes) => match Descriptor::parse(bytes, mode) {
            Ok(d) => {
                if mode.is_hardened() && !base_aligned(violation.data, d.header().data_alignment) {
                    warn!(
                        alignment = d.header().data_alignment,
                        "contract violation data blob is misaligned"
                    );
                    return gate.terminate(TerminationReason::MalformedDescriptor);
                }
                Some(Resolver::new(d, violation.data, vendors))
            }
            Err(err) if mode.is_hardened() => {
                warn!(%err, "rejected contract violation descriptor");
                return gate.terminate(TerminationReason::MalformedDescriptor);
            }
            Err(err) => {
                debug!(%err, "unreadable descriptor; reporting without static fields");
                None
            }
        },
    };

    let mut view = ViolationView::new(resolver, violation.detection, violation.semantic);
    if let Some(stream) = violation.dynamic {
        view = view.with_dynamic(stream);
    }
    gate.report(&view, handler)
}

fn base_aligned(data: &[u8], alignment: u8) -> bool {
    if data.is_empty() || alignment <= 1 {
        return true;
    }
    (data.as_ptr() as usize) % alignment as usize == 0
}
