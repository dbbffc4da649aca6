use criterion::{criterion_group, criterion_main, Criterion};

use sandpool::{Gc, Heap, Object, Root, Shape};
use std::cell::Cell;

#[derive(Shape)]
struct Node {
    left: Cell<Option<Gc<Node>>>,
    right: Cell<Option<Gc<Node>>>,
}

fn make_tree(heap: &Heap, depth: usize) -> Gc<Node> {
    let node = Root::<Gc<Node>>::empty();

    heap.with_roots(&[&node], || {
        node.set(Some(heap.alloc::<Node>().unwrap()));

        if depth > 0 {
            let left = make_tree(heap, depth - 1);
            unsafe { node.get().unwrap().get().left.set(Some(left)) };

            let right = make_tree(heap, depth - 1);
            unsafe { node.get().unwrap().get().right.set(Some(right)) };
        }

        node.get().unwrap()
    })
}

fn alloc_and_collect(c: &mut Criterion) {
    let heap = Heap::new();
    let pair = heap.get_or_create_descriptor(3, &[0b111]).unwrap();

    c.bench_function("alloc pair", |b| {
        b.iter(|| heap.allocate_object(pair).unwrap());
    });

    c.bench_function("alloc typed node", |b| {
        b.iter(|| heap.alloc::<Node>().unwrap());
    });

    c.bench_function("binary tree depth 10", |b| {
        b.iter(|| make_tree(&heap, 10));
    });

    let root = Root::<Object>::empty();

    heap.with_roots(&[&root], || {
        root.set(Some(make_tree(&heap, 14).object()));

        c.bench_function("collect 32k live nodes", |b| {
            b.iter(|| heap.collect());
        });
    });
}

criterion_group!(benches, alloc_and_collect);
criterion_main!(benches);
