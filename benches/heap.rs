use criterion::{BatchSize, Criterion, black_box, criterion_group, criterion_main};
use fixed_heap::{FreeListAllocator, HeapConfig};

pub fn bench_heap(c: &mut Criterion) {
    fn fresh() -> FreeListAllocator {
        FreeListAllocator::new(HeapConfig::default()).unwrap()
    }

    c.bench_function("allocate_until_full_64b", |b| {
        b.iter_batched(
            fresh,
            |mut heap| {
                while let Ok(handle) = heap.allocate(black_box(64)) {
                    black_box(handle);
                }
                heap
            },
            BatchSize::SmallInput,
        )
    });

    c.bench_function("allocate_free_pairs", |b| {
        b.iter_batched(
            fresh,
            |mut heap| {
                for size in [8usize, 24, 100, 512, 1024] {
                    let one = heap.allocate(black_box(size)).unwrap();
                    let two = heap.allocate(black_box(size)).unwrap();
                    heap.deallocate(one).unwrap();
                    heap.deallocate(two).unwrap();
                }
                heap
            },
            BatchSize::SmallInput,
        )
    });

    // every other block freed, then freed neighbours merge the rest
    c.bench_function("fragment_then_coalesce", |b| {
        b.iter_batched(
            || {
                let mut heap = fresh();
                let handles: Vec<_> = (0..256).map(|_| heap.allocate(48).unwrap()).collect();
                (heap, handles)
            },
            |(mut heap, handles)| {
                for handle in handles.iter().step_by(2) {
                    heap.deallocate(*handle).unwrap();
                }
                for handle in handles.iter().skip(1).step_by(2) {
                    heap.deallocate(*handle).unwrap();
                }
                heap
            },
            BatchSize::SmallInput,
        )
    });
}

criterion_group!(benches, bench_heap);
criterion_main!(benches);
