//! Integration Tests for Reactive Collections
//!
//! Observers of lists and dicts learn about every edit through the change
//! records the collections publish.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use indexmap::IndexMap;
use larch_core::{
    ActionKind, ActionPhase, ActionRecord, Dict, DictKey, List, Runtime, Schema, Value,
};

/// Schema whose rule reports the end record of the collection in `source`.
fn watcher_schema(records: Rc<RefCell<Vec<ActionRecord>>>) -> Rc<Schema> {
    Schema::builder("Watcher")
        .cell("source", Value::Null)
        .rule("_rule_watch", move |watcher| {
            let record = match watcher.get("source")? {
                Value::List(list) => list.action_end()?,
                Value::Dict(dict) => dict.action_end()?,
                _ => None,
            };
            records.borrow_mut().extend(record);
            Ok(())
        })
        .build()
        .unwrap()
}

/// Test that two list edits produce two distinguishable records.
#[test]
fn list_edits_publish_distinct_records() {
    let rt = Runtime::new();
    let records = Rc::new(RefCell::new(Vec::new()));
    let list = rt.list(Vec::<Value>::new()).unwrap();
    let _watcher = rt
        .create(&watcher_schema(records.clone()), [("source", Value::from(list.clone()))])
        .unwrap();
    assert!(records.borrow().is_empty());

    list.push(1).unwrap();
    let start = list.action_start().unwrap().unwrap();
    list.set(0, 2).unwrap();

    let records = records.borrow();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].kind(), ActionKind::Insert);
    assert_eq!(records[1].kind(), ActionKind::Assign);
    assert_ne!(records[0].seq, records[1].seq);
    assert!(records.iter().all(|r| r.phase == ActionPhase::End));

    assert_eq!(start.phase, ActionPhase::Start);
    assert_eq!(start.seq, records[0].seq);
    assert_eq!(list.to_vec().unwrap(), vec![Value::Int(2)]);
}

/// Test that replaying end records on a mirror reproduces the list.
#[test]
fn list_mirror_stays_in_sync() {
    let rt = Runtime::new();
    let list = rt.list([3, 1, 2]).unwrap();
    let mirror = Rc::new(RefCell::new(list.to_vec().unwrap()));

    let replay = mirror.clone();
    let schema = Schema::builder("Mirror")
        .cell("source", Value::Null)
        .rule("_rule_mirror", move |obj| {
            let list: List = obj.get_as("source")?;
            if let Some(record) = list.action_end()? {
                record.action.apply_to_seq(&mut replay.borrow_mut())?;
            }
            Ok(())
        })
        .build()
        .unwrap();
    let _observer = rt
        .create(&schema, [("source", Value::from(list.clone()))])
        .unwrap();

    list.push(4).unwrap();
    list.extend([5, 6]).unwrap();
    list.insert(0, 0).unwrap();
    list.remove_range(1..3).unwrap();
    list.sort().unwrap();
    list.reverse().unwrap();
    list.replace_range(1..2, [7, 8, 9]).unwrap();
    list.pop().unwrap();
    list.repeat(2).unwrap();

    assert_eq!(*mirror.borrow(), list.to_vec().unwrap());

    list.clear().unwrap();
    assert!(mirror.borrow().is_empty());
}

/// Test that an edit leaving the contents equal still notifies readers.
#[test]
fn equal_edit_still_notifies() {
    let rt = Runtime::new();
    let list = rt.list([1, 2]).unwrap();
    let runs = Rc::new(Cell::new(0));
    let count = runs.clone();
    let schema = Schema::builder("Length")
        .cell("source", Value::Null)
        .cell("len", 0)
        .rule("_rule_len", move |obj| {
            count.set(count.get() + 1);
            let list: List = obj.get_as("source")?;
            obj.set("len", list.len()? as i64)
        })
        .build()
        .unwrap();
    let length = rt
        .create(&schema, [("source", Value::from(list.clone()))])
        .unwrap();
    assert_eq!(length.get("len").unwrap(), Value::Int(2));

    list.set(0, 1).unwrap();
    assert_eq!(runs.get(), 2);

    list.push(3).unwrap();
    assert_eq!(length.get("len").unwrap(), Value::Int(3));
    assert_eq!(runs.get(), 3);
}

/// Test that a dict observer sees merges and removals.
#[test]
fn dict_mirror_stays_in_sync() {
    let rt = Runtime::new();
    let records = Rc::new(RefCell::new(Vec::new()));
    let dict: Dict = rt.dict([("a", 1), ("b", 2)]).unwrap();
    let _watcher = rt
        .create(&watcher_schema(records.clone()), [("source", Value::from(dict.clone()))])
        .unwrap();

    let mut mirror: IndexMap<DictKey, Value> = dict.to_map().unwrap();
    dict.insert("c", 3).unwrap();
    dict.update([("a", 10), ("d", 4)]).unwrap();
    assert_eq!(dict.remove("b").unwrap(), Value::Int(2));
    dict.pop_item().unwrap();

    for record in records.borrow().iter() {
        record.action.apply_to_map(&mut mirror).unwrap();
    }
    assert_eq!(mirror, dict.to_map().unwrap());
    assert_eq!(
        records.borrow().iter().map(|r| r.kind()).collect::<Vec<_>>(),
        vec![
            ActionKind::Merge,
            ActionKind::Merge,
            ActionKind::Remove,
            ActionKind::Remove,
        ]
    );
    assert_eq!(dict.get("a").unwrap(), Value::Int(10));
}

/// Test that a collection lives as long as a cell holds it.
#[test]
fn collection_owned_by_cell() {
    let rt = Runtime::new();
    let holder = Schema::builder("Holder")
        .cell("items", Value::Null)
        .build()
        .unwrap();
    let obj = rt.create(&holder, []).unwrap();

    obj.set("items", rt.list([1]).unwrap()).unwrap();
    assert_eq!(rt.stats().objects, 2);

    let list: List = obj.get_as("items").unwrap();
    list.push(2).unwrap();
    drop(list);

    obj.set("items", Value::Null).unwrap();
    assert_eq!(rt.stats().objects, 1);
}
