//! The per-violation aggregate handed to handlers.

use std::cell::Cell;
use std::marker::PhantomData;

use cvabi_descriptor::{
    EntryLocation, FieldId, FieldKind, FieldRange, FieldValue, ResolvedField, Resolver, TlvReader,
};
use tracing::debug;

use crate::{DetectionMode, EvaluationSemantic};

const CACHE_SLOTS: usize = 8;

type Located = Option<(EntryLocation, FieldKind)>;

/// Resolved-offset cache scoped to one view. Round-robin replacement.
struct OffsetCache {
    slots: [Cell<Option<(FieldId, Located)>>; CACHE_SLOTS],
    next: Cell<usize>,
}

impl OffsetCache {
    fn new() -> Self {
        Self {
            slots: std::array::from_fn(|_| Cell::new(None)),
            next: Cell::new(0),
        }
    }

    fn get(&self, id: FieldId) -> Option<Located> {
        self.slots.iter().find_map(|slot| match slot.get() {
            Some((cached, located)) if cached == id => Some(located),
            _ => None,
        })
    }

    fn put(&self, id: FieldId, located: Located) {
        let i = self.next.get();
        self.slots[i].set(Some((id, located)));
        self.next.set((i + 1) % CACHE_SLOTS);
    }
}

/// Everything known about one violation.
///
/// Created on the failing thread's stack for the duration of one dispatch.
/// The view is neither `Send` nor `Sync`.
pub struct ViolationView<'a> {
    resolver: Option<Resolver<'a>>,
    detection: DetectionMode,
    semantic: EvaluationSemantic,
    dynamic: Option<&'a [u8]>,
    cache: OffsetCache,
    _not_send: PhantomData<*const ()>,
}

impl<'a> ViolationView<'a> {
    /// `resolver` is `None` when no descriptor was supplied; every static
    /// lookup then reports absent.
    pub fn new(
        resolver: Option<Resolver<'a>>,
        detection: DetectionMode,
        semantic: EvaluationSemantic,
    ) -> Self {
        Self {
            resolver,
            detection,
            semantic,
            dynamic: None,
            cache: OffsetCache::new(),
            _not_send: PhantomData,
        }
    }

    pub fn with_dynamic(mut self, stream: &'a [u8]) -> Self {
        self.dynamic = Some(stream);
        self
    }

    pub fn detection_mode(&self) -> DetectionMode {
        self.detection
    }

    pub fn semantic(&self) -> EvaluationSemantic {
        self.semantic
    }

    pub fn resolver(&self) -> Option<&Resolver<'a>> {
        self.resolver.as_ref()
    }

    pub fn dynamic_stream(&self) -> Option<&'a [u8]> {
        self.dynamic
    }

    pub fn vendor_id(&self) -> Option<u8> {
        self.resolver
            .as_ref()
            .map(|r| r.descriptor().header().vendor_id)
    }

    /// Value of `id`, preferring the static descriptor over the dynamic
    /// stream.
    pub fn get(&self, id: FieldId) -> Option<FieldValue<'a>> {
        if let Some(f) = self.get_static(id) {
            return Some(f.value);
        }
        self.get_dynamic(id)
    }

    pub fn get_static(&self, id: FieldId) -> Option<ResolvedField<'a>> {
        let r = self.resolver.as_ref()?;
        let located = match self.cache.get(id) {
            Some(hit) => hit,
            None => {
                let located = r.locate(id);
                self.cache.put(id, located);
                located
            }
        };
        let Some((location, kind)) = located else {
            debug!(field = %id, "static field absent");
            return None;
        };
        r.resolve_at(id, location, kind)
    }

    /// Value of `id` from the dynamic stream. Vendor records resolve only
    /// under the descriptor's vendor; records whose kind is unknown come back
    /// as raw bytes.
    pub fn get_dynamic(&self, id: FieldId) -> Option<FieldValue<'a>> {
        let stream = self.dynamic?;
        let kind = match id.range() {
            FieldRange::Invalid => return None,
            FieldRange::Vendor { vendor, .. } => {
                let r = self.resolver.as_ref()?;
                if r.descriptor().header().vendor_id != vendor {
                    return None;
                }
                r.kind_of(id)
            }
            FieldRange::Standard | FieldRange::FutureStandard => match &self.resolver {
                Some(r) => r.kind_of(id),
                None => cvabi_descriptor::standard_field(id).map(|f| f.kind),
            },
        };
        let record = TlvReader::find_record(stream, id)?;
        Some(record.value(kind))
    }

    /// Every static field that resolves, in table order.
    pub fn static_fields(&self) -> Vec<ResolvedField<'a>> {
        self.resolver
            .as_ref()
            .map(|r| r.resolve_all())
            .unwrap_or_default()
    }

    #[cfg(test)]
    pub(crate) fn cached(&self, id: FieldId) -> bool {
        self.cache.get(id).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cvabi_descriptor::{Descriptor, DescriptorBuilder, TlvWriter, Validation, VendorRegistry};

    #[test]
    fn static_values_win_over_dynamic_ones() {
        let built = DescriptorBuilder::new(0)
            .u32(FieldId::LINE, 10)
            .build()
            .unwrap();
        let mut w = TlvWriter::new();
        w.push(FieldId::LINE, &99u32.to_ne_bytes()).unwrap();
        w.push(FieldId::COLUMN, &7u32.to_ne_bytes()).unwrap();
        let tlv = w.finish();

        let vendors = VendorRegistry::new();
        let d = Descriptor::parse(&built.descriptor, Validation::Hardened).unwrap();
        let view = ViolationView::new(
            Some(Resolver::new(d, built.data.as_slice(), &vendors)),
            DetectionMode::PredicateFalse,
            EvaluationSemantic::Observe,
        )
        .with_dynamic(&tlv);

        assert_eq!(view.get(FieldId::LINE), Some(FieldValue::U32(10)));
        assert_eq!(view.get(FieldId::COLUMN), Some(FieldValue::U32(7)));
        assert_eq!(view.get(FieldId::COMMENT), None);
    }

    #[test]
    fn lookups_are_cached_per_view() {
        let built = DescriptorBuilder::new(0)
            .u32(FieldId::LINE, 10)
            .build()
            .unwrap();
        let vendors = VendorRegistry::new();
        let d = Descriptor::parse(&built.descriptor, Validation::Hardened).unwrap();
        let view = ViolationView::new(
            Some(Resolver::new(d, built.data.as_slice(), &vendors)),
            DetectionMode::PredicateFalse,
            EvaluationSemantic::Enforce,
        );
        assert!(!view.cached(FieldId::LINE));
        assert_eq!(view.get(FieldId::LINE), Some(FieldValue::U32(10)));
        assert!(view.cached(FieldId::LINE));
        assert_eq!(view.get(FieldId::LINE), Some(FieldValue::U32(10)));
        assert_eq!(view.get(FieldId::COMMENT), None);
        assert!(view.cached(FieldId::COMMENT));

        let other = ViolationView::new(
            Some(Resolver::new(d, built.data.as_slice(), &vendors)),
            DetectionMode::PredicateFalse,
            EvaluationSemantic::Enforce,
        );
        assert!(!other.cached(FieldId::LINE));
    }

    #[test]
    fn cache_evicts_round_robin() {
        let cache = OffsetCache::new();
        for i in 0..(CACHE_SLOTS as u16 + 1) {
            cache.put(FieldId(i + 1), None);
        }
        assert_eq!(cache.get(FieldId(1)), None);
        assert_eq!(cache.get(FieldId(2)), Some(None));
    }

    #[test]
    fn missing_descriptor_leaves_only_dynamic_standard_fields() {
        let mut w = TlvWriter::new();
        w.push(FieldId::LINE, &3u32.to_ne_bytes()).unwrap();
        w.push(FieldId::vendor(1, 1), &[1]).unwrap();
        let tlv = w.finish();
        let view = ViolationView::new(
            None,
            DetectionMode::EvaluationException,
            EvaluationSemantic::Observe,
        )
        .with_dynamic(&tlv);
        assert_eq!(view.get(FieldId::LINE), Some(FieldValue::U32(3)));
        assert_eq!(view.get(FieldId::vendor(1, 1)), None);
        assert!(view.static_fields().is_empty());
        assert_eq!(view.vendor_id(), None);
    }
}
