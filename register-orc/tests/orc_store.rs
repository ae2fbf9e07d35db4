#![cfg(unix)]

use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use register_core::{
    Datatype, Field, Item, MultiValueRegister, Region, Register, RegisterError, Schema, Store,
};
use register_orc::{OrcConfig, OrcError, OrcStore};

#[derive(Clone, Default)]
struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    fn lines(&self) -> Vec<String> {
        String::from_utf8(self.0.lock().unwrap().clone())
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn store(buffer: &SharedBuffer) -> OrcStore<SharedBuffer> {
    let config = OrcConfig {
        program: "true".into(),
        store: "test.sqlite".into(),
    };
    OrcStore::with_writer(config, buffer.clone())
}

fn body_type_schema() -> Schema {
    Schema::new(
        "body-type",
        "european-commission",
        "Types of notified body.",
        [
            Field::new("body-type", Datatype::String, "The body type code."),
            Field::new("name", Datatype::String, "The name of the body type."),
        ],
    )
    .unwrap()
}

#[test]
fn register_streams_commands_in_order() {
    let buffer = SharedBuffer::default();
    let store = store(&buffer);

    let mut register = Register::init(&store, body_type_schema()).unwrap();
    register
        .append_entry(
            Region::User,
            "NB",
            Item::new().with("body-type", "NB").with("name", "Notified body"),
        )
        .unwrap();
    register.finish().unwrap();

    let lines = buffer.lines();
    assert_eq!(
        lines[0],
        r#"(ensure-entry "body-type" "system" "name" "{\"name\":\"body-type\"}")"#
    );
    let user_line = concat!(
        r#"(ensure-entry "body-type" "user" "NB" "#,
        r#""{\"body-type\":\"NB\",\"name\":\"Notified body\"}")"#
    );
    assert!(lines.iter().any(|line| line == user_line));
    let tail = &lines[lines.len() - 2..];
    assert_eq!(
        tail,
        [
            r#"(delete-untouched "body-type" "system")"#,
            r#"(delete-untouched "body-type" "user")"#,
        ]
    );
}

#[test]
fn multi_value_register_sends_ensure_items() {
    let buffer = SharedBuffer::default();
    let store = store(&buffer);

    let schema = Schema::new(
        "annex",
        "european-commission",
        "Annexes of legislation.",
        [
            Field::new("annex", Datatype::String, "Annex number."),
            Field::new("text", Datatype::Text, "Annex text."),
        ],
    )
    .unwrap();
    let mut register = MultiValueRegister::init(&store, schema).unwrap();
    register
        .append_entry(Region::User, "II", Item::new().with("annex", "II").with("text", "a"))
        .unwrap();
    register
        .append_entry(Region::User, "II", Item::new().with("annex", "II").with("text", "b"))
        .unwrap();
    assert!(!buffer.lines().iter().any(|line| line.contains(r#""user""#)));

    register.finish().unwrap();
    let user: Vec<_> = buffer
        .lines()
        .into_iter()
        .filter(|line| line.starts_with(r#"(ensure-items "annex" "user""#))
        .collect();
    assert_eq!(
        user,
        [concat!(
            r#"(ensure-items "annex" "user" "II" "#,
            r#""{\"annex\":\"II\",\"text\":\"a\"}" "{\"annex\":\"II\",\"text\":\"b\"}")"#
        )]
    );
}

#[test]
fn close_without_batch_process() {
    let buffer = SharedBuffer::default();
    let store = store(&buffer);
    store.delete_untouched("body-type", Region::User).unwrap();
    assert_eq!(store.config().program.to_str(), Some("true"));
    store.close().unwrap();

    assert_eq!(buffer.lines(), [r#"(delete-untouched "body-type" "user")"#]);
}

#[test]
fn store_error_surfaces_through_register() {
    let config = OrcConfig {
        program: "false".into(),
        store: "test.sqlite".into(),
    };
    let store = OrcStore::with_writer(config, Vec::new());
    let err = Register::init(&store, body_type_schema()).err().unwrap();
    match err {
        RegisterError::Store(source) => {
            let orc = source.downcast_ref::<OrcError>().unwrap();
            assert!(matches!(orc, OrcError::Failed { .. }));
        }
        other => panic!("unexpected error: {other}"),
    }
}

/// A writer that fails with a broken pipe once `broken` is set.
#[derive(Clone, Default)]
struct FlakyWriter {
    broken: Arc<AtomicBool>,
}

impl Write for FlakyWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.broken.load(Ordering::SeqCst) {
            return Err(io::Error::from(io::ErrorKind::BrokenPipe));
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn assert_broken_pipe(err: RegisterError) {
    match err {
        RegisterError::Store(source) => match source.downcast_ref::<OrcError>() {
            Some(OrcError::Io(e)) => assert_eq!(e.kind(), io::ErrorKind::BrokenPipe),
            other => panic!("unexpected store error: {other:?}"),
        },
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn channel_write_failure_surfaces_through_register() {
    let writer = FlakyWriter::default();
    let config = OrcConfig {
        program: "true".into(),
        store: "test.sqlite".into(),
    };
    let store = OrcStore::with_writer(config, writer.clone());
    let mut register = Register::init(&store, body_type_schema()).unwrap();

    writer.broken.store(true, Ordering::SeqCst);
    let err = register
        .append_entry(
            Region::User,
            "NB",
            Item::new().with("body-type", "NB").with("name", "Notified body"),
        )
        .unwrap_err();
    assert_broken_pipe(err);
    assert_eq!(register.items().count(), 0);

    assert_broken_pipe(register.finish().unwrap_err());
    assert!(!register.is_finished());
}
