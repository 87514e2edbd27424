#![no_main]

use cvabi_descriptor::{
    Descriptor, FieldId, FieldKind, Resolver, TableCatalog, Validation, VendorRegistry,
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
    let cut = (split as usize * rest.len()) / 255;
    let (descriptor, blob) = rest.split_at(cut);

    let mut vendors = VendorRegistry::new();
    vendors.register(1, TableCatalog::new().with_field(1, "a", FieldKind::U64));

    for mode in [Validation::Hardened, Validation::Trusting] {
        let Ok(d) = Descriptor::parse(descriptor, mode) else {
            continue;
        };
        let r = Resolver::new(d, blob, &vendors);
        for e in d.entries().iter() {
            let _ = r.resolve(e.field);
        }
        let _ = r.resolve_all();
        if mode.is_hardened() {
            // A validated index never disagrees with the table.
            for e in d.entries().iter() {
                assert_eq!(d.find(e.field), d.find_direct(e.field));
            }
            assert_eq!(d.find(FieldId(0x0099)), d.find_direct(FieldId(0x0099)));
        }
    }
});
