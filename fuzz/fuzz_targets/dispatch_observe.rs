#![no_main]

use cvabi_descriptor::{AlignedBytes, FieldId, Validation, VendorRegistry};
use cvabi_runtime::{
    dispatch, DetectionMode, Dispatch, DispatchGate, EvaluationSemantic, Violation, ViolationView,
};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let data = if data.len() > 64 * 1024 {
        &data[..64 * 1024]
    } else {
        data
    };
    let Some((&split, rest)) = data.split_first() else {
        return;
    };
    let a = (split as usize * rest.len()) / 255;
    let (descriptor, rest) = rest.split_at(a);
    let (blob, tlv) = rest.split_at(rest.len() / 2);
    let blob = AlignedBytes::from_slice(blob);
    let vendors = VendorRegistry::new();

    let handler = |v: &ViolationView<'_>| {
        for raw in [1u16, 2, 4, 0x11, 0x0200, 0x8101] {
            let _ = v.get(FieldId(raw));
        }
        let _ = v.static_fields();
    };
    for mode in [Validation::Hardened, Validation::Trusting] {
        let gate = DispatchGate::new();
        let out = dispatch(
            &gate,
            Violation {
                descriptor: Some(descriptor),
                data: blob.as_slice(),
                detection: DetectionMode::PredicateFalse,
                semantic: EvaluationSemantic::Observe,
                dynamic: Some(tlv),
            },
            mode,
            &vendors,
            &handler,
        );
        if !mode.is_hardened() {
            assert_eq!(out, Dispatch::Continue);
        }
    }
});
