use std::sync::Arc;

use criterion::{
    criterion_group, criterion_main, AxisScale, BenchmarkId, Criterion, PlotConfiguration,
    Throughput,
};
use escdf::{
    data_type::DataType,
    group::Group,
    selection::{Hyperslab, Selection},
    specs::{
        AttributeId, AttributeSpec, DatasetId, DatasetSpec, Dimension, GroupId, GroupSpecBuilder,
        SpecsRegistry,
    },
    storage::{store::MemoryStore, HierarchyStorageTraits},
};

fn selection_indices(c: &mut Criterion) {
    let plot_config = PlotConfiguration::default().summary_scale(AxisScale::Logarithmic);
    let mut group = c.benchmark_group("selection_indices");
    group.plot_config(plot_config);

    for size in [32u64, 64, 128].iter() {
        let shape = vec![*size; 3];
        let size3 = size * size * size;
        let half = Hyperslab::new(vec![0, 0, 0], vec![*size, *size, size / 2])
            .with_stride(vec![1, 1, 2]);
        let half = Selection::from(half);
        group.throughput(Throughput::Elements(size3 / 2));
        group.bench_function(BenchmarkId::new("strided", size3), |b| {
            b.iter(|| half.linearised_indices(&shape).unwrap());
        });
    }
}

fn dataset_transfer(c: &mut Criterion) {
    let mut registry = SpecsRegistry::new();
    let spec = GroupSpecBuilder::new(GroupId(0), "bench")
        .attribute(AttributeSpec::new(AttributeId(0), "n", DataType::UInt))
        .dataset(DatasetSpec::new(
            DatasetId(0),
            "values",
            DataType::Double,
            vec![Dimension::Attribute(AttributeId(0))],
        ))
        .build()
        .unwrap();
    registry.register(spec).unwrap();

    let plot_config = PlotConfiguration::default().summary_scale(AxisScale::Logarithmic);
    let mut group = c.benchmark_group("dataset_transfer");
    group.plot_config(plot_config);

    for size in [1u32 << 10, 1 << 14, 1 << 18].iter() {
        let store = Arc::new(MemoryStore::new());
        let mut bench = Group::open_or_create(store.clone(), &registry, &store.root(), GroupId(0), None)
            .unwrap();
        bench.set_attribute(AttributeId(0), *size).unwrap();
        let dataset = bench.create_dataset(DatasetId(0)).unwrap();
        let values: Vec<f64> = (0..*size).map(f64::from).collect();

        group.throughput(Throughput::Bytes(u64::from(*size) * 8));
        group.bench_function(BenchmarkId::new("write_full", size), |b| {
            b.iter(|| dataset.write_full(values.as_slice()).unwrap());
        });
        group.bench_function(BenchmarkId::new("read_full", size), |b| {
            b.iter(|| dataset.read_full::<f64>().unwrap());
        });
    }
}

criterion_group!(benches, selection_indices, dataset_transfer);
criterion_main!(benches);
