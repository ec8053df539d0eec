//! Benchmark for building the device ownership map and merging it into an
//! inventory listing

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use orchestrator_dashboard::{
    build_ownership_map, merge_into_inventory, InventoryDevice, InventoryNode, OsdMetadataFeed,
    OsdMetadataRecord,
};

const HOSTS: usize = 50;
const DEVICES_PER_HOST: usize = 24;

fn feed() -> OsdMetadataFeed {
    let mut feed = OsdMetadataFeed::new();
    let mut osd_id = 0;
    for host in 0..HOSTS {
        for device in 0..DEVICES_PER_HOST {
            // Every OSD shares one of four NVMe devices for its DB
            let devices = format!("sd{},nvme{}n1", device, device % 4);
            feed.insert(
                osd_id.to_string(),
                OsdMetadataRecord::new(format!("host-{:03}", host), devices),
            );
            osd_id += 1;
        }
    }
    feed
}

fn inventory() -> Vec<InventoryNode> {
    (0..HOSTS)
        .map(|host| InventoryNode {
            name: format!("host-{:03}", host),
            addr: None,
            devices: (0..DEVICES_PER_HOST)
                .map(|d| InventoryDevice::new(format!("sd{}", d)))
                .chain((0..4).map(|d| InventoryDevice::new(format!("nvme{}n1", d))))
                .collect(),
        })
        .collect()
}

fn bench_build_map(c: &mut Criterion) {
    let feed = feed();
    let mut group = c.benchmark_group("ownership_map");
    group.throughput(Throughput::Elements(feed.len() as u64));

    group.bench_function("build", |b| {
        b.iter(|| build_ownership_map(black_box(&feed)))
    });

    group.finish();
}

fn bench_merge(c: &mut Criterion) {
    let map = match build_ownership_map(&feed()) {
        Ok(map) => map,
        Err(e) => panic!("benchmark feed is invalid: {}", e),
    };
    let nodes = inventory();
    let mut group = c.benchmark_group("ownership_map");
    group.throughput(Throughput::Elements((HOSTS * (DEVICES_PER_HOST + 4)) as u64));

    group.bench_function("merge", |b| {
        b.iter(|| {
            let mut nodes = nodes.clone();
            merge_into_inventory(black_box(&mut nodes), &map);
            nodes
        })
    });

    group.finish();
}

criterion_group!(benches, bench_build_map, bench_merge);
criterion_main!(benches);
