use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use zeolite::{props, Document};
use zeolite_int_test::test_util::{cleanup, create_test_context, run_test};

#[ctor::ctor]
fn init() {
    colog::init();
}

#[test]
fn test_immediate_delivery_on_mutating_thread() {
    run_test(
        create_test_context,
        |ctx| {
            let collection = ctx.db().default_collection()?;
            let delivered_on = Arc::new(Mutex::new(None));

            let delivered_clone = delivered_on.clone();
            let _token = collection.add_change_listener(move |_| {
                *delivered_clone.lock() = Some(thread::current().id());
            })?;

            collection.save(&Document::with_id("foo"))?;
            // by default the listener ran inline, on the saving thread
            assert_eq!(*delivered_on.lock(), Some(thread::current().id()));
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_buffered_delivery_waits_for_send() {
    run_test(
        create_test_context,
        |ctx| {
            let db = ctx.db();
            let collection = db.default_collection()?;

            let calls = Arc::new(Mutex::new(Vec::new()));
            let calls_clone = calls.clone();
            let _token = collection.add_change_listener(move |change| {
                calls_clone.lock().push(change.doc_ids().to_vec());
            })?;

            let ready = Arc::new(AtomicUsize::new(0));
            let ready_clone = ready.clone();
            db.buffer_notifications(Arc::new(move || {
                ready_clone.fetch_add(1, Ordering::SeqCst);
            }))?;

            collection.save(&Document::with_id("a"))?;
            collection.save(&Document::with_id("b"))?;
            collection.save(&Document::with_id("c"))?;

            // nothing delivered yet; ready pinged once on empty-to-non-empty
            assert!(calls.lock().is_empty());
            assert_eq!(ready.load(Ordering::SeqCst), 1);

            db.send_notifications()?;
            // one coalesced call carrying all three commits, in order
            assert_eq!(*calls.lock(), [vec!["a".to_string(), "b".into(), "c".into()]]);

            // the next commit starts a new round
            collection.save(&Document::with_id("d"))?;
            assert_eq!(ready.load(Ordering::SeqCst), 2);
            db.send_notifications()?;
            assert_eq!(calls.lock().len(), 2);
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_coalescing_dedupes_repeated_documents() {
    run_test(
        create_test_context,
        |ctx| {
            let db = ctx.db();
            let collection = db.default_collection()?;

            let calls = Arc::new(Mutex::new(Vec::new()));
            let calls_clone = calls.clone();
            let _token = collection.add_change_listener(move |change| {
                calls_clone.lock().push(change.doc_ids().to_vec());
            })?;

            db.buffer_notifications(Arc::new(|| {}))?;

            let doc = Document::with_properties("foo", props! { n: 0 });
            collection.save(&doc)?;
            doc.put("n", 1i64).unwrap();
            collection.save(&doc)?;
            collection.save(&Document::with_id("bar"))?;

            db.send_notifications()?;
            // foo changed twice but appears once, at its first position
            assert_eq!(*calls.lock(), [vec!["foo".to_string(), "bar".into()]]);
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_buffered_document_listener_hears_each_commit() {
    run_test(
        create_test_context,
        |ctx| {
            let db = ctx.db();
            let collection = db.default_collection()?;

            let hits = Arc::new(AtomicUsize::new(0));
            let hits_clone = hits.clone();
            let _token = collection.add_document_change_listener("foo", move |change| {
                assert_eq!(change.doc_id(), "foo");
                hits_clone.fetch_add(1, Ordering::SeqCst);
            })?;

            db.buffer_notifications(Arc::new(|| {}))?;
            let doc = Document::with_properties("foo", props! { n: 0 });
            collection.save(&doc)?;
            doc.put("n", 1i64).unwrap();
            collection.save(&doc)?;

            db.send_notifications()?;
            // coalescing dedupes the collection-level change but the
            // per-document listener still fires once per commit
            assert_eq!(hits.load(Ordering::SeqCst), 2);
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_cross_handle_notification() {
    run_test(
        create_test_context,
        |ctx| {
            let db_b = ctx.open_sibling()?;
            let c_a = ctx.db().default_collection()?;
            let c_b = db_b.default_collection()?;

            let seen = Arc::new(Mutex::new(Vec::new()));
            let seen_clone = seen.clone();
            let _token = c_b.add_change_listener(move |change| {
                seen_clone.lock().push(change.doc_ids().to_vec());
            })?;

            // a commit through one handle notifies listeners on the other
            c_a.save(&Document::with_id("foo"))?;
            assert_eq!(*seen.lock(), [["foo".to_string()]]);

            // buffering is per handle: db_b defers while db_a's own
            // listeners would still run immediately
            db_b.buffer_notifications(Arc::new(|| {}))?;
            c_a.save(&Document::with_id("bar"))?;
            assert_eq!(seen.lock().len(), 1);
            db_b.send_notifications()?;
            assert_eq!(seen.lock().len(), 2);

            db_b.close()?;
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_document_listener_and_removal_mid_stream() {
    run_test(
        create_test_context,
        |ctx| {
            let collection = ctx.db().default_collection()?;
            let hits = Arc::new(AtomicUsize::new(0));

            let hits_clone = hits.clone();
            let token = collection.add_document_change_listener("watched", move |change| {
                assert_eq!(change.doc_id(), "watched");
                hits_clone.fetch_add(1, Ordering::SeqCst);
            })?;

            let doc = Document::with_properties("watched", props! { n: 0 });
            collection.save(&doc)?;
            collection.save(&Document::with_id("ignored"))?;
            assert_eq!(hits.load(Ordering::SeqCst), 1);

            token.remove();
            doc.put("n", 1i64).unwrap();
            collection.save(&doc)?;
            assert_eq!(hits.load(Ordering::SeqCst), 1);
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_close_discards_buffered_notifications() {
    run_test(
        create_test_context,
        |ctx| {
            let db = ctx.db();
            let collection = db.default_collection()?;

            let hits = Arc::new(AtomicUsize::new(0));
            let hits_clone = hits.clone();
            let _token = collection.add_change_listener(move |_| {
                hits_clone.fetch_add(1, Ordering::SeqCst);
            })?;

            db.buffer_notifications(Arc::new(|| {}))?;
            collection.save(&Document::with_id("foo"))?;
            db.close()?;

            assert_eq!(hits.load(Ordering::SeqCst), 0);
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_concurrent_writers_all_observed() {
    const THREADS: usize = 4;
    const SAVES: usize = 25;

    run_test(
        create_test_context,
        |ctx| {
            let collection = ctx.db().default_collection()?;
            let seen: Arc<Mutex<HashSet<String>>> = Arc::new(Mutex::new(HashSet::new()));

            let seen_clone = seen.clone();
            let _token = collection.add_change_listener(move |change| {
                seen_clone.lock().extend(change.doc_ids().iter().cloned());
            })?;

            thread::scope(|s| {
                for t in 0..THREADS {
                    let collection = collection.clone();
                    s.spawn(move || {
                        for i in 0..SAVES {
                            let doc = Document::with_id(format!("doc-{}-{}", t, i));
                            collection.save(&doc).unwrap();
                        }
                    });
                }
            });

            // every commit was delivered to the listener exactly by the
            // time the last save returned
            assert_eq!(seen.lock().len(), THREADS * SAVES);
            Ok(())
        },
        cleanup,
    )
}
