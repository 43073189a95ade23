use std::alloc::{GlobalAlloc, Layout, System};
use std::sync::atomic::{AtomicUsize, Ordering};

use fashion_mlp::{ClassifierBuilder, Dataset, Optimizer, TrainConfig, Trainer};

struct CountingAlloc {
    allocs: AtomicUsize,
    reallocs: AtomicUsize,
}

impl CountingAlloc {
    const fn new() -> Self {
        Self {
            allocs: AtomicUsize::new(0),
            reallocs: AtomicUsize::new(0),
        }
    }

    fn reset(&self) {
        self.allocs.store(0, Ordering::Relaxed);
        self.reallocs.store(0, Ordering::Relaxed);
    }

    fn alloc_events(&self) -> usize {
        self.allocs.load(Ordering::Relaxed) + self.reallocs.load(Ordering::Relaxed)
    }
}

unsafe impl GlobalAlloc for CountingAlloc {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        self.allocs.fetch_add(1, Ordering::Relaxed);
        unsafe { System.alloc(layout) }
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        self.allocs.fetch_add(1, Ordering::Relaxed);
        unsafe { System.alloc_zeroed(layout) }
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        unsafe { System.dealloc(ptr, layout) }
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        self.reallocs.fetch_add(1, Ordering::Relaxed);
        unsafe { System.realloc(ptr, layout, new_size) }
    }
}

#[global_allocator]
static ALLOC: CountingAlloc = CountingAlloc::new();

fn make_dataset(len: usize, input_dim: usize, num_classes: usize) -> Dataset {
    let inputs = vec![0.1_f32; len * input_dim];
    let labels = (0..len).map(|i| i % num_classes).collect();
    Dataset::from_flat(inputs, labels, input_dim, num_classes).unwrap()
}

#[test]
fn train_epoch_does_not_allocate_per_batch() {
    if cfg!(feature = "matrixmultiply") {
        // The `matrixmultiply` backend may allocate internal packing buffers.
        return;
    }

    let input_dim = 32;
    let num_classes = 4;
    let batch_size = 16;

    let base = ClassifierBuilder::new(input_dim)
        .unwrap()
        .hidden(64)
        .unwrap()
        .hidden(32)
        .unwrap()
        .dropout(0.2)
        .unwrap()
        .build_with_seed(num_classes, 0)
        .unwrap();

    let train_small = make_dataset(batch_size, input_dim, num_classes);
    let train_large = make_dataset(batch_size * 64, input_dim, num_classes);

    let cfg = TrainConfig {
        epochs: 1,
        batch_size,
        lr: 1e-3,
        optimizer: Optimizer::default(),
        shuffle: true,
        seed: 3,
    };

    let mut model_small = base.clone();
    let mut trainer_small = Trainer::new(&model_small, cfg).unwrap();
    ALLOC.reset();
    trainer_small
        .train_epoch(&mut model_small, &train_small)
        .unwrap();
    let alloc_small = ALLOC.alloc_events();

    let mut model_large = base;
    let mut trainer_large = Trainer::new(&model_large, cfg).unwrap();
    ALLOC.reset();
    trainer_large
        .train_epoch(&mut model_large, &train_large)
        .unwrap();
    let alloc_large = ALLOC.alloc_events();

    assert_eq!(
        alloc_small, alloc_large,
        "allocation count grew with the number of batches: small={alloc_small} large={alloc_large}"
    );
    assert_eq!(trainer_large.steps(), 64);
}
