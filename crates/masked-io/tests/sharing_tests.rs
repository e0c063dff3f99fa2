//! Integration tests for sharing and copying rules between writers.

use std::io::Write;
use std::sync::Arc;

use masked_io::{MaskedWriter, Rule, SharedSink};

fn manual_writer() -> MaskedWriter<SharedSink> {
    MaskedWriter::builder(SharedSink::new())
        .auto_flush(false)
        .build()
}

#[test]
fn shared_writer_sees_new_keywords() {
    let writer = manual_writer();
    let sink = SharedSink::new();
    let mut derived = writer.derive_shared(sink.clone());

    writer.add_keywords(["passw0rd"]);
    derived.write_all(b"password: passw0rd").unwrap();
    derived.flush().unwrap();
    assert_eq!(sink.contents_string(), "password: *****");
    sink.clear();

    writer.add_keywords(["secret"]);
    derived.write_all(b"password: secret").unwrap();
    derived.flush().unwrap();
    assert_eq!(sink.contents_string(), "password: *****");
}

#[test]
fn shared_mutation_flows_both_ways() {
    let writer = manual_writer();
    let derived = writer.derive_shared(Vec::new());

    derived.add_keywords(["from-derived"]);
    derived.set_mask_token("##");
    assert_eq!(writer.rule().keywords(), vec!["from-derived".to_string()]);
    assert_eq!(writer.rule().mask_token(), "##");
    assert!(Arc::ptr_eq(&writer.rule(), &derived.rule()));
}

#[test]
fn independent_writer_keeps_its_copy() {
    let writer = manual_writer();
    writer.add_keywords(["passw0rd"]);
    let sink = SharedSink::new();
    let mut derived = writer.derive_independent(sink.clone());

    derived.write_all(b"password: passw0rd").unwrap();
    derived.flush().unwrap();
    assert_eq!(sink.contents_string(), "password: *****");
    sink.clear();

    writer.add_keywords(["secret"]);
    derived.write_all(b"password: secret").unwrap();
    derived.flush().unwrap();
    assert_eq!(sink.contents_string(), "password: secret");
}

#[test]
fn independent_mutation_does_not_propagate_back() {
    let writer = manual_writer();
    writer.add_keywords(["one"]);
    let derived = writer.derive_independent(Vec::new());

    derived.add_keywords(["two"]);
    derived.set_mask_token("X");
    assert_eq!(writer.rule().keywords(), vec!["one".to_string()]);
    assert_eq!(writer.rule().mask_token(), "*****");
}

#[test]
fn pending_buffers_are_per_writer() {
    let writer = manual_writer();
    writer.add_keywords(["secret"]);
    let sink = SharedSink::new();
    let mut derived = writer.derive_shared(sink.clone());

    (&writer).write_all(b"sec").unwrap();
    derived.write_all(b"ret").unwrap();

    assert_eq!(writer.pending_len(), 3);
    assert_eq!(derived.pending_len(), 0);
    assert_eq!(sink.contents_string(), "ret");
}

#[test]
fn one_rule_many_writers() {
    let rule = Arc::new(Rule::new());
    let a_sink = SharedSink::new();
    let b_sink = SharedSink::new();
    let mut a = rule.writer(a_sink.clone());
    let mut b = MaskedWriter::with_rule(b_sink.clone(), Arc::clone(&rule));
    a.disable_auto_flush();
    b.disable_auto_flush();

    rule.add_keywords(["token"]);
    a.write_all(b"token a\n").unwrap();
    b.write_all(b"token b\n").unwrap();

    assert_eq!(a_sink.contents_string(), "***** a\n");
    assert_eq!(b_sink.contents_string(), "***** b\n");
}

#[test]
fn set_rule_detaches_from_shared_rule() {
    let writer = manual_writer();
    let sink = SharedSink::new();
    let mut derived = writer.derive_shared(sink.clone());

    derived.set_rule(Arc::new(Rule::new().with_keywords(["mine"])));
    writer.add_keywords(["theirs"]);

    derived.write_all(b"mine theirs").unwrap();
    assert_eq!(sink.contents_string(), "***** theirs");
}
