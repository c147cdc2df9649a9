use criterion::{BatchSize, Criterion, criterion_group, criterion_main};
use pipetag_metadata::{MetadataCache, TagSet};
use pipetag_tagging::{
    TagMemoryMap,
    tag_file::{read_tags, write_tags},
};
use std::{hint::black_box, sync::Arc};

const INSTRUCTIONS: u32 = 0x4000;

/// Tags shaped like a code image, runs of the same group broken up by the odd branch
fn tags_for(index: u32) -> TagSet {
    let group = if index % 7 == 0 { 2 } else { 1 };

    TagSet::from_tags([0, group]).unwrap()
}

fn tagged_code() -> TagMemoryMap {
    let mut map = TagMemoryMap::new(0x8000_0000, Arc::new(MetadataCache::new()));

    for index in 0..INSTRUCTIONS {
        let address = 0x8000_0000 + index * 4;
        map.add_range(address, address + 4, &tags_for(index)).unwrap();
    }

    map
}

fn criterion_benchmark(c: &mut Criterion) {
    c.bench_function("instruction_granular_insert", |b| {
        b.iter(|| black_box(tagged_code()))
    });

    c.bench_function("overlapping_insert", |b| {
        b.iter_batched(
            tagged_code,
            |mut map| {
                let tags = TagSet::from_tags([5]).unwrap();
                map.add_range(0x8000_0000, 0x8000_0000 + INSTRUCTIONS * 4, &tags)
                    .unwrap();
                map
            },
            BatchSize::SmallInput,
        )
    });

    let map = tagged_code();
    let mut encoded = Vec::new();
    write_tags(&map, &mut encoded).unwrap();

    c.bench_function("encode", |b| {
        b.iter(|| {
            let mut bytes = Vec::with_capacity(encoded.len());
            write_tags(black_box(&map), &mut bytes).unwrap();
            bytes
        })
    });

    c.bench_function("decode", |b| {
        b.iter(|| {
            let mut decoded = TagMemoryMap::new(0x8000_0000, Arc::new(MetadataCache::new()));
            read_tags(&mut decoded, black_box(encoded.as_slice())).unwrap();
            decoded
        })
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
