use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use dal_table::{Array, DalError, thread_allocation_count};
use proptest::prelude::*;
use rand::Rng;

#[test]
fn zeros_and_full() {
    let zeros = Array::<u64>::zeros(9).unwrap();
    assert!(zeros.get_data().iter().all(|&v| v == 0));
    assert_eq!(zeros.get_size(), 72);

    let full = Array::full(4, -1i8).unwrap();
    assert_eq!(full.to_vec(), vec![-1; 4]);
}

#[test]
fn allocation_counter_sees_materialization_only() {
    let before = thread_allocation_count();
    let a = Array::<f32>::zeros(16).unwrap();
    let b = a.clone();
    let _view = b.view(2, 4);
    assert_eq!(thread_allocation_count(), before + 1);

    let mut c = b.clone();
    c.unique().unwrap();
    assert_eq!(thread_allocation_count(), before + 2);
}

#[test]
fn from_vec_takes_ownership_without_copy() {
    let values = vec![1u16, 2, 3];
    let ptr = values.as_ptr();
    let before = thread_allocation_count();
    let array = Array::from_vec(values);
    assert_eq!(thread_allocation_count(), before);
    assert_eq!(array.as_ptr(), ptr);
    assert!(array.has_mutable_data());
}

#[test]
fn writable_wrap_allows_in_place_mutation() {
    let mut storage = [0i32; 4];
    {
        let mut view = unsafe { Array::wrap_mut(storage.as_mut_ptr(), 4) };
        assert!(!view.is_owning());
        view.get_mutable_data()[3] = 8;
    }
    assert_eq!(storage, [0, 0, 0, 8]);
}

#[test]
fn shared_deleter_runs_once_across_threads() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let values = Box::leak(vec![3.0f64; 32].into_boxed_slice());
    let array = unsafe {
        Array::wrap_with_deleter(values.as_mut_ptr(), 32, move |p| {
            counter.fetch_add(1, Ordering::SeqCst);
            drop(Box::from_raw(std::ptr::slice_from_raw_parts_mut(p, 32)));
        })
    };

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let copy = array.clone();
            std::thread::spawn(move || copy.get_data().iter().sum::<f64>())
        })
        .collect();
    drop(array);
    for handle in handles {
        assert_eq!(handle.join().unwrap(), 96.0);
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn resize_of_read_only_wrap_is_invalid_operation() {
    let values = [1u8, 2];
    let mut view = unsafe { Array::wrap(values.as_ptr(), 2) };
    assert!(matches!(view.resize(4), Err(DalError::InvalidOperation(_))));
    assert_eq!(view.get_data(), &[1, 2]);
}

#[test]
#[should_panic(expected = "no mutable data")]
fn mutable_access_to_shared_array_panics() {
    let mut a = Array::from_vec(vec![1i64]);
    let _b = a.clone();
    a.get_mutable_data();
}

#[test]
fn random_resizes_preserve_prefix() {
    let mut rng = rand::rng();
    let mut array = Array::from_vec((0..10u32).collect::<Vec<_>>());
    let mut model: Vec<u32> = (0..10).collect();
    for _ in 0..200 {
        let k = rng.random_range(0..64usize);
        array.resize(k).unwrap();
        model.resize(k, 0);
        assert!(array.get_capacity() >= k);
        assert_eq!(array.get_data(), model.as_slice());
        if k > 0 {
            let i = rng.random_range(0..k);
            let v = rng.random::<u32>();
            array.unique().unwrap().get_mutable_data()[i] = v;
            model[i] = v;
        }
    }
}

proptest! {
    #[test]
    fn resize_keeps_old_values(values in prop::collection::vec(any::<i32>(), 0..200), k in 0usize..400) {
        let mut array = Array::from_vec(values.clone());
        let shared = array.clone();
        array.resize(k).unwrap();
        let kept = values.len().min(k);
        prop_assert_eq!(&array.get_data()[..kept], &values[..kept]);
        prop_assert!(array.get_capacity() >= k);
        // The other handle never observes the resize.
        prop_assert_eq!(shared.get_data(), values.as_slice());
    }
}
