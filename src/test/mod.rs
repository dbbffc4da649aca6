use crate::allocator::{Word, STORAGE_WORDS, WORD_BYTES};
use crate::{AllocError, Config, GcState, Heap, Object, Root, Signature};

const PAIR_POINTERS: [Word; 1] = [0b111];

// A data array that, together with the two descriptors it needs, exactly
// fills the first pool of a fresh heap.
fn allocate_pool_filler(heap: &Heap) -> Object {
    heap.allocate_data_array((STORAGE_WORDS - 8) * WORD_BYTES, 1).unwrap()
}

#[test]
fn fixed_point_describes_itself() {
    let heap = Heap::new();
    let pair = heap.get_or_create_descriptor(3, &PAIR_POINTERS).unwrap();
    let parent = unsafe { pair.object().descriptor() };

    assert_eq!(parent.size(), 3);
    assert_eq!(parent.pointer_word(0), 1);
    assert_eq!(unsafe { parent.object().descriptor() }, parent);
    assert_ne!(parent, pair);
}

#[test]
fn descriptors_are_interned() {
    let heap = Heap::new();
    let a = heap.get_or_create_descriptor(3, &PAIR_POINTERS).unwrap();
    let b = heap.get_or_create_descriptor(3, &[Word::MAX]).unwrap();
    let c = heap.get_or_create_descriptor(3, &[0b011]).unwrap();

    assert_eq!(a, b);
    assert_ne!(a, c);

    // Two record shapes plus the shared descriptor-descriptor.
    assert_eq!(heap.metrics().descriptors, 3);
    assert_eq!(heap.occupied_words(), 9);
}

#[test]
fn wide_descriptors_chain_down_to_the_fixed_point() {
    let heap = Heap::new();
    let wide = heap.get_or_create_descriptor(100, &[0b1, 0b1]).unwrap();
    let parent = unsafe { wide.object().descriptor() };
    let root = unsafe { parent.object().descriptor() };

    assert_eq!(wide.size(), 100);
    assert_eq!(wide.bitmap_len(), 2);
    assert!(wide.is_pointer(64));
    assert_eq!(parent.size(), 4);
    assert_eq!(root.size(), 3);
    assert_eq!(unsafe { root.object().descriptor() }, root);
    assert_eq!(heap.occupied_words(), 4 + 3 + 3);
}

#[test]
fn descriptors_survive_without_user_roots() {
    let heap = Heap::new();

    heap.get_or_create_descriptor(3, &PAIR_POINTERS).unwrap();
    heap.descriptor_for_data_array(10, 8).unwrap();
    heap.descriptor_for_pointer_array(5).unwrap();

    let before = heap.occupied_words();

    heap.collect();

    assert_eq!(heap.occupied_words(), before);
    assert_eq!(heap.metrics().live_words, before);
    assert_eq!(heap.state(), GcState::Idle);
}

#[test]
fn data_arrays_keep_their_descriptor_alive() {
    let heap = Heap::new();
    let root = Root::<Object>::empty();

    heap.with_roots(&[&root], || {
        let data = heap.allocate_data_array(100, 1).unwrap();

        unsafe {
            assert_eq!(data.len(), 100);
            assert_eq!(data.size(), 2 + 13);
            data.data_bytes()[99] = 7;
        }

        root.set(Some(data));
        heap.collect();

        let descriptor = unsafe { data.descriptor() };

        assert!(!descriptor.has_pointers());
        assert!(heap.is_occupied(descriptor.object().as_ptr()));
        assert_eq!(heap.occupied_words(), 15 + 3 + 3);
        assert_eq!(unsafe { data.data_bytes()[99] }, 7);
    });
}

#[test]
fn freeing_a_descriptor_is_ignored() {
    let heap = Heap::new();
    let pair = heap.get_or_create_descriptor(3, &PAIR_POINTERS).unwrap();
    let before = heap.occupied_words();

    unsafe { heap.free(pair.object()) };

    assert_eq!(heap.occupied_words(), before);
}

#[test]
fn foreign_descriptors_are_rejected() {
    let heap = Heap::new();
    let other = Heap::new();
    let pair = other.get_or_create_descriptor(3, &PAIR_POINTERS).unwrap();

    assert_eq!(heap.allocate_object(pair), Err(AllocError::BadRequest));
    assert!(other.allocate_object(pair).is_ok());
}

#[test]
fn oversized_requests_are_rejected() {
    let heap = Heap::new();

    assert_eq!(
        heap.get_or_create_descriptor(STORAGE_WORDS + 1, &[]).err(),
        Some(AllocError::BadRequest)
    );
    assert_eq!(
        heap.allocate_pointer_array(STORAGE_WORDS).err(),
        Some(AllocError::BadRequest)
    );
    assert_eq!(
        heap.allocate_data_array(usize::MAX / 2, 4).err(),
        Some(AllocError::BadRequest)
    );
    assert_eq!(
        heap.allocate_data_array(usize::MAX, 1).err(),
        Some(AllocError::BadRequest)
    );
    assert!(heap.allocate_pointer_array(STORAGE_WORDS - 2).is_ok());
}

#[test]
fn new_pools_request_a_collection() {
    let heap = Heap::new();

    allocate_pool_filler(&heap);
    assert!(!heap.collection_pending());
    assert_eq!(heap.occupied_words(), STORAGE_WORDS);

    allocate_pool_filler(&heap);
    assert!(heap.collection_pending());
    assert_eq!(heap.pool_count(), 2);

    assert!(heap.gc_yield());
    assert!(!heap.collection_pending());
    assert!(!heap.gc_yield());
    assert_eq!(heap.metrics().collections, 1);
}

#[test]
fn collect_on_grow_can_be_turned_off() {
    let heap = Heap::with_config(Config {
        collect_on_grow: false,
        ..Config::default()
    });

    for _ in 0..3 {
        allocate_pool_filler(&heap);
    }

    assert!(!heap.collection_pending());
    assert_eq!(heap.metrics().collections, 0);
    assert_eq!(heap.pool_count(), 3);
}

#[test]
fn signatures_can_be_read_back() {
    let heap = Heap::new();
    let signature = Signature::pointer_array(7).unwrap();
    let descriptor = heap.descriptor_for_signature(signature.clone()).unwrap();

    assert_eq!(descriptor.signature(), signature);
    assert_eq!(
        heap.descriptor_for_pointer_array(7).unwrap().object(),
        descriptor.object()
    );
}
