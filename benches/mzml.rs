use criterion::{black_box, criterion_group, criterion_main, Criterion};

use mzstream::io::mzml::{ExportOptions, ImportOptions, MzMLExporter, MzMLImporter};
use mzstream::io::ByteSource;
use mzstream::spectrum::bindata::{
    decode, decode_transport, encode, encode_transport, ArrayEncoding, BinaryDataArrayType,
    CompressionChain, NumpressCompression,
};

const N_SPECTRA: usize = 200;
const N_POINTS: usize = 2000;

fn mz_values() -> Vec<f64> {
    (0..N_POINTS).map(|i| 200.0 + i as f64 * 0.7513).collect()
}

fn intensity_values() -> Vec<f64> {
    (0..N_POINTS)
        .map(|i| ((i * 7919) % 10007) as f64 * 13.5)
        .collect()
}

fn binary_array(accession: &str, name: &str, values: &[f64], encoding: ArrayEncoding) -> String {
    let text = encode_transport(&encode(values, &encoding).unwrap());
    let dtype = encoding.declared_precision().as_param().unwrap();
    let compression = encoding.compression.as_param();
    format!(
        r#"<binaryDataArray encodedLength="{}">
<cvParam cvRef="MS" accession="{}" name="{}" value=""/>
<cvParam cvRef="MS" accession="{}" name="{}" value=""/>
<cvParam cvRef="MS" accession="{accession}" name="{name}" value=""/>
<binary>{text}</binary>
</binaryDataArray>
"#,
        text.len(),
        dtype.curie().unwrap(),
        dtype.name,
        compression.curie().unwrap(),
        compression.name,
    )
}

fn generate_document() -> Vec<u8> {
    let zlib64 = ArrayEncoding::new(BinaryDataArrayType::Float64, CompressionChain::ZLIB);
    let zlib32 = ArrayEncoding::new(BinaryDataArrayType::Float32, CompressionChain::ZLIB);
    let mz_block = binary_array("MS:1000514", "m/z array", &mz_values(), zlib64);
    let int_block = binary_array("MS:1000515", "intensity array", &intensity_values(), zlib32);

    let mut doc = String::from(
        r#"<?xml version="1.0" encoding="utf-8"?>
<mzML xmlns="http://psi.hupo.org/ms/mzml" version="1.1.0">
<run id="bench">
"#,
    );
    doc.push_str(&format!("<spectrumList count=\"{N_SPECTRA}\">\n"));
    for i in 0..N_SPECTRA {
        doc.push_str(&format!(
            r#"<spectrum index="{i}" id="scan={}" defaultArrayLength="{N_POINTS}">
<cvParam cvRef="MS" accession="MS:1000511" name="ms level" value="1"/>
<scanList count="1">
<scan>
<cvParam cvRef="MS" accession="MS:1000016" name="scan start time" value="{}" unitCvRef="UO" unitAccession="UO:0000010" unitName="second"/>
</scan>
</scanList>
<binaryDataArrayList count="2">
"#,
            i + 1,
            i as f64 * 0.5
        ));
        doc.push_str(&mz_block);
        doc.push_str(&int_block);
        doc.push_str("</binaryDataArrayList>\n</spectrum>\n");
    }
    doc.push_str("</spectrumList>\n</run>\n</mzML>\n");
    doc.into_bytes()
}

fn codec(c: &mut Criterion) {
    let values = mz_values();
    for (label, encoding) in [
        (
            "decode_f64_zlib",
            ArrayEncoding::new(BinaryDataArrayType::Float64, CompressionChain::ZLIB),
        ),
        (
            "decode_numpress_linear",
            ArrayEncoding::new(
                BinaryDataArrayType::Float64,
                CompressionChain::numpress(NumpressCompression::Linear, false),
            ),
        ),
    ] {
        let text = encode_transport(&encode(&values, &encoding).unwrap());
        c.bench_function(label, |b| {
            b.iter(|| {
                let bytes = decode_transport(black_box(text.as_bytes())).unwrap();
                decode(
                    &bytes,
                    Some(encoding.declared_precision()),
                    N_POINTS,
                    encoding.compression,
                )
                .unwrap()
            })
        });
    }
}

fn import_and_export(c: &mut Criterion) {
    let doc = generate_document();
    c.bench_function("import_skipping_payloads", |b| {
        b.iter(|| {
            let raw = MzMLImporter::new(ImportOptions::default())
                .import_source(ByteSource::from_bytes(black_box(doc.clone())))
                .unwrap()
                .complete()
                .unwrap();
            assert_eq!(raw.len(), N_SPECTRA);
        })
    });
    c.bench_function("import_scanning_payloads", |b| {
        b.iter(|| {
            let raw = MzMLImporter::new(
                ImportOptions::default().with_skip_binary_payloads(false),
            )
            .import_source(ByteSource::from_bytes(black_box(doc.clone())))
            .unwrap()
            .complete()
            .unwrap();
            assert_eq!(raw.len(), N_SPECTRA);
        })
    });

    let raw = MzMLImporter::default()
        .import_source(ByteSource::from_bytes(doc))
        .unwrap()
        .complete()
        .unwrap();
    c.bench_function("export", |b| {
        b.iter(|| {
            let mut buffer = Vec::new();
            MzMLExporter::new(ExportOptions::default())
                .export_to(black_box(&raw), &mut buffer)
                .unwrap();
            buffer.len()
        })
    });
}

criterion_group!(benches, codec, import_and_export);
criterion_main!(benches);
