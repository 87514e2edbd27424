#![no_main]

use cvabi_descriptor::{FieldId, FieldKind, TlvReader};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let data = if data.len() > 64 * 1024 {
        &data[..64 * 1024]
    } else {
        data
    };

    let mut reader = TlvReader::new(data);
    for rec in reader.by_ref() {
        let _ = rec.value(Some(FieldKind::U32));
        let _ = rec.value(None);
    }
    assert!(reader.position() <= data.len());
    assert!(reader.finished() || reader.truncated());
    let _ = TlvReader::find_record(data, FieldId::COMMENT);
});
