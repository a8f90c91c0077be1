use super::*;

fn keys(l: &LruList<u32>) -> Vec<u32> {
    l.iter().collect()
}

#[test]
fn newest_insert_has_rank_zero() {
    let mut l = LruList::new();
    for k in 1..=4u32 {
        l.push_front(k);
    }
    assert_eq!(keys(&l), vec![4, 3, 2, 1]);
    assert_eq!(l.rank(&4), Some(0));
    assert_eq!(l.rank(&1), Some(3));
    assert_eq!(l.rank(&9), None);
    assert_eq!(l.len(), 4);
}

#[test]
fn touch_moves_to_front_and_pop_back_takes_oldest() {
    let mut l = LruList::new();
    for k in 1..=3u32 {
        l.push_front(k);
    }
    assert!(l.touch(&1));
    assert!(!l.touch(&7));
    assert_eq!(keys(&l), vec![1, 3, 2]);
    assert_eq!(l.pop_back(), Some(2));
    assert_eq!(l.pop_back(), Some(3));
    assert_eq!(l.pop_back(), Some(1));
    assert_eq!(l.pop_back(), None);
    assert!(l.is_empty());
}

#[test]
fn remove_middle_and_reuse_slot() {
    let mut l = LruList::new();
    for k in 1..=3u32 {
        l.push_front(k);
    }
    assert!(l.remove(&2));
    assert!(!l.remove(&2));
    assert_eq!(keys(&l), vec![3, 1]);
    l.push_front(5);
    assert_eq!(keys(&l), vec![5, 3, 1]);
    assert!(l.contains(&5));
}

#[test]
fn push_back_appends_as_oldest() {
    let mut l = LruList::new();
    l.push_back(1u32);
    l.push_back(2);
    l.push_front(3);
    assert_eq!(keys(&l), vec![3, 1, 2]);
    l.clear();
    assert!(l.is_empty());
    assert_eq!(l.iter().count(), 0);
}
