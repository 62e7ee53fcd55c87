//! Mark-and-sweep over the object arena.
//!
//! Collection only runs when the embedder asks for it, between jobs. The
//! mark phase walks strong edges (property values and accessors,
//! prototypes, dense elements, proxy target/handler, view buffers,
//! registry held values and callbacks); WeakRef targets and registry
//! cell targets/tokens are deliberately not edges. After the sweep the
//! weak tracker reacts: dead WeakRef targets are cleared, live registry
//! cells whose target died become cleanup-pending, and one cleanup job is
//! enqueued per affected registry. Callbacks never run inside collection.

use super::weak::CellState;
use super::{Exotic, Job, JsObjectData, ObjRef, Realm};
use crate::types::JsValue;

fn push_value(value: &JsValue, out: &mut Vec<u64>) {
    if let Some(id) = value.object_id() {
        out.push(id);
    }
}

fn trace_object(data: &JsObjectData, out: &mut Vec<u64>) {
    if let Some(proto) = data.prototype {
        out.push(proto);
    }
    if let Some(v) = &data.primitive_value {
        push_value(v, out);
    }
    for (_key, desc) in data.table.iter() {
        if let Some(v) = &desc.value {
            push_value(v, out);
        }
        if let Some(g) = &desc.get {
            push_value(g, out);
        }
        if let Some(s) = &desc.set {
            push_value(s, out);
        }
    }
    match &data.exotic {
        Exotic::Array(storage) => storage.trace_object_ids(out),
        Exotic::Arguments(map) => map.trace_object_ids(out),
        Exotic::Proxy(p) => {
            if let Some(t) = p.target {
                out.push(t);
            }
            if let Some(h) = p.handler {
                out.push(h);
            }
        }
        Exotic::TypedArray(view) | Exotic::DataView(view) => out.push(view.buffer_id),
        Exotic::FinalizationRegistry(registry) => {
            push_value(&registry.callback, out);
            // Held values are strong; cell targets and tokens are not.
            for cell in &registry.cells {
                push_value(&cell.held, out);
            }
        }
        // WeakRef targets are the weak edge this collector exists for.
        Exotic::WeakRef(_) => {}
        Exotic::ArrayBuffer(_)
        | Exotic::StringWrapper
        | Exotic::Namespace(_)
        | Exotic::Ordinary => {}
    }
}

impl Realm {
    pub(crate) fn allocate_object_slot(&mut self, obj: ObjRef) -> u64 {
        let index = match self.free_list.pop() {
            Some(index) => {
                self.objects[index] = Some(obj.clone());
                index
            }
            None => {
                self.objects.push(Some(obj.clone()));
                self.objects.len() - 1
            }
        };
        obj.borrow_mut().id = Some(index as u64);
        index as u64
    }

    /// How many arena slots currently hold an object.
    pub fn live_object_count(&self) -> usize {
        self.objects.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn collect_garbage(&mut self) {
        let mut marked = vec![false; self.objects.len()];
        let mut worklist: Vec<u64> = Vec::new();

        // Roots: intrinsics, the explicit root list, kept-alive pins,
        // everything referenced from queued jobs and unsettled waits, and
        // errors awaiting collection by the embedder.
        worklist.extend(self.intrinsics.all());
        for value in &self.roots {
            push_value(value, &mut worklist);
        }
        worklist.extend(self.kept_alive.iter().copied());
        for job in &self.jobs {
            match job {
                Job::Call { func, this, args } => {
                    push_value(func, &mut worklist);
                    push_value(this, &mut worklist);
                    for arg in args {
                        push_value(arg, &mut worklist);
                    }
                }
                Job::RegistryCleanup { registry } => worklist.push(*registry),
            }
        }
        for wait in &self.pending_waits {
            push_value(&wait.callback, &mut worklist);
        }
        for err in &self.unhandled_errors {
            push_value(err, &mut worklist);
        }

        while let Some(id) = worklist.pop() {
            let index = id as usize;
            if index >= marked.len() || marked[index] {
                continue;
            }
            let Some(obj) = self.objects[index].clone() else {
                continue;
            };
            marked[index] = true;
            trace_object(&obj.borrow(), &mut worklist);
        }

        let mut any_died = false;
        for (index, slot) in self.objects.iter_mut().enumerate() {
            if slot.is_some() && !marked[index] {
                *slot = None;
                self.free_list.push(index);
                any_died = true;
            }
        }
        if !any_died {
            return;
        }

        // Weak reactions, strictly after the sweep.
        let dead = |id: u64| !marked.get(id as usize).copied().unwrap_or(false);
        let mut registries_to_clean = Vec::new();
        for (index, slot) in self.objects.iter().enumerate() {
            let Some(obj) = slot else { continue };
            let mut b = obj.borrow_mut();
            match &mut b.exotic {
                Exotic::WeakRef(weak) => {
                    if weak.target.get().is_some_and(dead) {
                        weak.target.set(None);
                    }
                }
                Exotic::FinalizationRegistry(registry) => {
                    let mut newly_pending = false;
                    for cell in registry.cells.iter_mut() {
                        if cell.state == CellState::Live && dead(cell.target) {
                            cell.state = CellState::Pending;
                            newly_pending = true;
                        }
                        if cell.token.is_some_and(dead) {
                            cell.token = None;
                        }
                    }
                    if newly_pending {
                        registries_to_clean.push(index as u64);
                    }
                }
                _ => {}
            }
        }
        for registry in registries_to_clean {
            self.enqueue_registry_cleanup(registry);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::JsFunction;
    use crate::types::PropertyKey;

    #[test]
    fn unreachable_objects_are_reclaimed_and_slots_reused() {
        let mut realm = Realm::new();
        let baseline = realm.live_object_count();

        let garbage = realm.create_object();
        let garbage_id = garbage.object_id().unwrap();
        drop(garbage);
        realm.collect_garbage();
        assert_eq!(realm.live_object_count(), baseline);

        // The freed slot is handed out again.
        let next = realm.create_object();
        assert_eq!(next.object_id(), Some(garbage_id));
    }

    #[test]
    fn rooted_objects_and_their_graph_survive() {
        let mut realm = Realm::new();
        let parent = realm.create_object();
        let child = realm.create_object();
        realm
            .set(&parent, &PropertyKey::string("child"), child.clone())
            .unwrap();
        realm.root(parent.clone());

        realm.collect_garbage();
        let v = realm.get(&parent, &PropertyKey::string("child")).unwrap();
        assert!(v.is_object());

        realm.unroot(&parent);
        realm.collect_garbage();
        assert!(realm.get(&parent, &PropertyKey::string("child")).is_err());
    }

    #[test]
    fn prototype_cycles_do_not_leak_or_survive() {
        let mut realm = Realm::new();
        let baseline = realm.live_object_count();
        // a -> b -> a through properties.
        let a = realm.create_object();
        let b = realm.create_object();
        realm.set(&a, &PropertyKey::string("b"), b.clone()).unwrap();
        realm.set(&b, &PropertyKey::string("a"), a.clone()).unwrap();
        drop((a, b));
        realm.collect_garbage();
        assert_eq!(realm.live_object_count(), baseline);
    }

    #[test]
    fn weak_ref_cleared_only_when_target_dies() {
        let mut realm = Realm::new();
        let target = realm.create_object();
        let wr = realm.create_weak_ref(&target).unwrap();
        realm.root(wr.clone());
        realm.root(target.clone());

        realm.collect_garbage();
        assert!(realm.weak_ref_deref(&wr).unwrap().is_object());

        realm.unroot(&target);
        drop(target);
        // The deref above pinned the target; a turn boundary unpins it.
        realm.run_jobs();
        realm.collect_garbage();
        assert!(realm.weak_ref_deref(&wr).unwrap().is_undefined());
    }

    #[test]
    fn finalization_fires_exactly_once_at_job_boundary() {
        let mut realm = Realm::new();
        let counter = realm.create_object();
        realm
            .set(&counter, &PropertyKey::string("n"), JsValue::Number(0.0))
            .unwrap();
        realm.root(counter.clone());

        let counter_clone = counter.clone();
        let cb = realm.create_function(JsFunction::native("cb", 1, move |realm, _, args| {
            let n = match realm.get(&counter_clone, &PropertyKey::string("n"))? {
                JsValue::Number(n) => n,
                _ => 0.0,
            };
            realm.set(
                &counter_clone,
                &PropertyKey::string("n"),
                JsValue::Number(n + 1.0),
            )?;
            realm.set(
                &counter_clone,
                &PropertyKey::string("held"),
                args.first().cloned().unwrap_or(JsValue::Undefined),
            )?;
            Ok(JsValue::Undefined)
        }));
        let registry = realm.create_finalization_registry(&cb).unwrap();
        realm.root(registry.clone());

        let target = realm.create_object();
        realm
            .registry_register(&registry, &target, JsValue::string("tag"), None)
            .unwrap();
        drop(target);

        // Nothing fires during collection itself.
        realm.collect_garbage();
        let n = realm.get(&counter, &PropertyKey::string("n")).unwrap();
        assert!(matches!(n, JsValue::Number(v) if v == 0.0));

        realm.run_jobs();
        let n = realm.get(&counter, &PropertyKey::string("n")).unwrap();
        assert!(matches!(n, JsValue::Number(v) if v == 1.0));
        let held = realm.get(&counter, &PropertyKey::string("held")).unwrap();
        assert!(matches!(held, JsValue::String(s) if s.to_rust_string() == "tag"));

        // Another collection cycle must not re-fire the cell.
        realm.collect_garbage();
        realm.run_jobs();
        let n = realm.get(&counter, &PropertyKey::string("n")).unwrap();
        assert!(matches!(n, JsValue::Number(v) if v == 1.0));
    }
}
