//! Property-based tests
//!
//! Random edit sequences checked against plain models.

use std::cell::RefCell;
use std::rc::Rc;

use larch_core::{List, Runtime, Schema, Value};
use proptest::prelude::*;

const CELLS: usize = 6;

#[derive(Debug, Clone)]
enum Edit {
    Push(i64),
    Insert(usize, i64),
    Set(usize, i64),
    Remove(usize),
    Reverse,
    Sort,
    Clear,
}

fn edit() -> impl Strategy<Value = Edit> {
    prop_oneof![
        4 => any::<i64>().prop_map(Edit::Push),
        2 => (any::<usize>(), any::<i64>()).prop_map(|(i, v)| Edit::Insert(i, v)),
        2 => (any::<usize>(), any::<i64>()).prop_map(|(i, v)| Edit::Set(i, v)),
        2 => any::<usize>().prop_map(Edit::Remove),
        1 => Just(Edit::Reverse),
        1 => Just(Edit::Sort),
        1 => Just(Edit::Clear),
    ]
}

/// Apply `edit` to both the list and the model; indices wrap into range.
fn apply(list: &List, model: &mut Vec<i64>, edit: &Edit) {
    match *edit {
        Edit::Push(v) => {
            list.push(v).unwrap();
            model.push(v);
        }
        Edit::Insert(i, v) => {
            let i = i % (model.len() + 1);
            list.insert(i, v).unwrap();
            model.insert(i, v);
        }
        Edit::Set(i, v) if !model.is_empty() => {
            let i = i % model.len();
            list.set(i, v).unwrap();
            model[i] = v;
        }
        Edit::Remove(i) if !model.is_empty() => {
            let i = i % model.len();
            assert_eq!(list.remove(i).unwrap(), Value::Int(model.remove(i)));
        }
        Edit::Reverse => {
            list.reverse().unwrap();
            model.reverse();
        }
        Edit::Sort => {
            list.sort().unwrap();
            model.sort();
        }
        Edit::Clear => {
            list.clear().unwrap();
            model.clear();
        }
        Edit::Set(..) | Edit::Remove(_) => {}
    }
}

fn mask_schema() -> Rc<Schema> {
    let mut builder = Schema::builder("Mask").cell("mask", 0);
    for i in 0..CELLS {
        builder = builder.cell(&format!("c{i}"), 0);
    }
    builder
        .rule("_rule_read", |obj| {
            let mask = obj.get_as::<i64>("mask")?;
            for i in 0..CELLS {
                if mask & (1 << i) != 0 {
                    obj.get(&format!("c{i}"))?;
                }
            }
            Ok(())
        })
        .build()
        .unwrap()
}

proptest! {
    /// A list and its replayed mirror both match a plain vector.
    #[test]
    fn list_edits_match_model(edits in prop::collection::vec(edit(), 0..40)) {
        let rt = Runtime::new();
        let list = rt.list(Vec::<Value>::new()).unwrap();
        let mirror = Rc::new(RefCell::new(Vec::new()));

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
        let _observer = rt.create(&schema, [("source", Value::from(list.clone()))]).unwrap();

        let mut model = Vec::new();
        for edit in &edits {
            apply(&list, &mut model, edit);
        }

        let expected: Vec<Value> = model.into_iter().map(Value::Int).collect();
        prop_assert_eq!(list.to_vec().unwrap(), expected.clone());
        prop_assert_eq!(mirror.borrow().clone(), expected);
    }

    /// After every run, a rule depends on exactly the cells it read.
    #[test]
    fn dependencies_equal_reads(masks in prop::collection::vec(0i64..(1 << CELLS), 1..20)) {
        let rt = Runtime::new();
        let obj = rt.create(&mask_schema(), []).unwrap();

        for mask in masks {
            obj.set("mask", mask).unwrap();
            for i in 0..CELLS {
                let dependents = obj.cell(&format!("c{i}")).unwrap().dependents().unwrap();
                prop_assert_eq!(dependents.len(), usize::from(mask & (1 << i) != 0));
            }
            prop_assert_eq!(rt.stats().edges, mask.count_ones() as usize + 1);
        }
    }
}
