//! Common test utilities for UniRep tests
//!
//! Fixture builders for sequence files, legacy weight bundles and
//! dispatchers backed by the in-process mock runtime.
#![allow(dead_code)]

use serde_pickle::{HashableValue, SerOptions, Value};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use unirep::core::dispatcher::{JobDispatcher, RuntimeProvider};
use unirep::core::job::ModelSize;
use unirep::tools::{ModelRuntime, MockRuntime};
use unirep::weights::schema::MLSTM_PARAMS;

/// Test environment that owns a temporary directory
pub struct TestEnvironment {
    temp_dir: TempDir,
}

impl TestEnvironment {
    pub fn new() -> Self {
        TestEnvironment {
            temp_dir: TempDir::new().expect("Failed to create temp dir"),
        }
    }

    pub fn root(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Get a path within the test environment
    pub fn path(&self, relative: &str) -> PathBuf {
        self.temp_dir.path().join(relative)
    }

    /// Write a file, creating parent directories
    pub fn write(&self, relative: &str, contents: &str) -> PathBuf {
        let path = self.path(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create parent dir");
        }
        std::fs::write(&path, contents).expect("Failed to write file");
        path
    }

    /// Directory runs are written under
    pub fn outputs(&self) -> PathBuf {
        self.path("outputs")
    }
}

/// Shape of every array in a fixture bundle, dense weights aside
pub const EMBED_SHAPE: [usize; 2] = [26, 10];
pub const DENSE_OUT: usize = 25;
pub const MATRIX_SHAPE: [usize; 2] = [10, 4];
pub const BIAS_SHAPE: [usize; 1] = [4];

/// Reference shape of a parameter inside one mLSTM block
pub fn param_shape(param: &str) -> Vec<usize> {
    if param == "b" {
        BIAS_SHAPE.to_vec()
    } else {
        MATRIX_SHAPE.to_vec()
    }
}

/// Nested list of numbers with the given shape
pub fn array_value(shape: &[usize], seed: f64) -> Value {
    match shape.split_first() {
        None => Value::F64(seed),
        Some((&len, rest)) => Value::List(
            (0..len)
                .map(|i| array_value(rest, seed + i as f64 * 0.5))
                .collect(),
        ),
    }
}

fn block(seed: f64) -> Value {
    let mut params = BTreeMap::new();
    for (i, param) in MLSTM_PARAMS.iter().enumerate() {
        params.insert(
            HashableValue::String(param.to_string()),
            array_value(&param_shape(param), seed + i as f64),
        );
    }
    Value::Dict(params)
}

/// Bundle laid out like the original training code's pickle for `dim`
pub fn legacy_bundle(dim: usize) -> Value {
    let dense = Value::Tuple(vec![
        array_value(&[dim, DENSE_OUT], 0.1),
        array_value(&[DENSE_OUT], 0.2),
    ]);
    let mut entries = vec![array_value(&EMBED_SHAPE, 0.0)];
    if dim == 64 || dim == 256 {
        for stack in 0..4 {
            entries.push(block(stack as f64));
            if stack < 3 {
                entries.push(Value::None);
            }
        }
    } else {
        entries.push(block(0.0));
    }
    entries.push(dense);
    entries.push(Value::None);
    Value::List(entries)
}

/// Pickle a bundle for `dim` into `dir/model_weights.pkl`
pub fn write_legacy_bundle(dir: &Path, dim: usize) -> PathBuf {
    let path = dir.join(format!("model_weights_{}.pkl", dim));
    let bytes = serde_pickle::value_to_vec(&legacy_bundle(dim), SerOptions::new())
        .expect("Failed to pickle bundle");
    std::fs::write(&path, bytes).expect("Failed to write bundle");
    path
}

/// Writes pickles the way Python 3 writes NumPy `float32` arrays with protocol 2
///
/// Arrays go through `numpy.core.multiarray._reconstruct` and a `BUILD` of
/// `(1, shape, dtype, False, raw)`. Raw data and the dtype are memoized, so
/// every array after the first refers back to the dtype with a `GET`.
pub struct NumpyPickler {
    out: Vec<u8>,
    next_memo: u32,
    globals: HashMap<String, u32>,
    latin1: Option<u32>,
    dtype: Option<u32>,
}

impl NumpyPickler {
    pub fn new() -> Self {
        NumpyPickler {
            out: vec![0x80, 0x02],
            next_memo: 0,
            globals: HashMap::new(),
            latin1: None,
            dtype: None,
        }
    }

    pub fn finish(mut self) -> Vec<u8> {
        self.out.push(b'.');
        self.out
    }

    fn op(&mut self, code: u8) {
        self.out.push(code);
    }

    fn put(&mut self) -> u32 {
        let id = self.next_memo;
        self.next_memo += 1;
        if id < 256 {
            self.out.extend([b'q', id as u8]);
        } else {
            self.op(b'r');
            self.out.extend(id.to_le_bytes());
        }
        id
    }

    fn get(&mut self, id: u32) {
        if id < 256 {
            self.out.extend([b'h', id as u8]);
        } else {
            self.op(b'j');
            self.out.extend(id.to_le_bytes());
        }
    }

    fn global(&mut self, module: &str, name: &str) {
        let key = format!("{}\n{}\n", module, name);
        if let Some(&id) = self.globals.get(&key) {
            self.get(id);
            return;
        }
        self.op(b'c');
        self.out.extend(key.as_bytes());
        let id = self.put();
        self.globals.insert(key, id);
    }

    fn unicode(&mut self, text: &str) -> u32 {
        self.op(b'X');
        self.out.extend((text.len() as u32).to_le_bytes());
        self.out.extend(text.as_bytes());
        self.put()
    }

    fn int(&mut self, n: i64) {
        match n {
            0..=0xff => self.out.extend([b'K', n as u8]),
            0x100..=0xffff => {
                self.op(b'M');
                self.out.extend((n as u16).to_le_bytes());
            }
            _ => {
                self.op(b'J');
                self.out.extend((n as i32).to_le_bytes());
            }
        }
    }

    /// `bytes` under protocol 2: `_codecs.encode(raw.decode('latin1'), 'latin1')`
    fn bytes(&mut self, raw: &[u8]) {
        if raw.is_empty() {
            self.global("__builtin__", "bytes");
            self.op(b')');
            self.op(b'R');
            self.put();
            return;
        }
        self.global("_codecs", "encode");
        let text: String = raw.iter().map(|&b| b as char).collect();
        self.unicode(&text);
        match self.latin1 {
            Some(id) => self.get(id),
            None => self.latin1 = Some(self.unicode("latin1")),
        }
        self.op(0x86);
        self.put();
        self.op(b'R');
        self.put();
    }

    fn dtype(&mut self) {
        if let Some(id) = self.dtype {
            self.get(id);
            return;
        }
        self.global("numpy", "dtype");
        self.unicode("f4");
        self.op(0x89);
        self.op(0x88);
        self.op(0x87);
        self.put();
        self.op(b'R');
        self.dtype = Some(self.put());

        self.op(b'(');
        self.int(3);
        self.unicode("<");
        self.op(b'N');
        self.op(b'N');
        self.op(b'N');
        self.int(-1);
        self.int(-1);
        self.int(0);
        self.op(b't');
        self.put();
        self.op(b'b');
    }

    /// A C-ordered `float32` array whose flat element `i` is `seed + i / 4`
    pub fn array(&mut self, shape: &[usize], seed: f32) {
        self.global("numpy.core.multiarray", "_reconstruct");
        self.global("numpy", "ndarray");
        self.int(0);
        self.op(0x85);
        self.put();
        self.bytes(b"b");
        self.op(0x87);
        self.put();
        self.op(b'R');
        self.put();

        self.op(b'(');
        self.int(1);
        for &dim in shape {
            self.int(dim as i64);
        }
        match shape.len() {
            0 => self.op(b')'),
            1 => self.op(0x85),
            2 => self.op(0x86),
            n => panic!("{}-d fixture arrays are not supported", n),
        }
        if !shape.is_empty() {
            self.put();
        }
        self.dtype();
        self.op(0x89);
        let count: usize = shape.iter().product();
        let raw: Vec<u8> = (0..count)
            .flat_map(|i| numpy_element(seed, i).to_le_bytes())
            .collect();
        self.bytes(&raw);
        self.op(b't');
        self.put();
        self.op(b'b');
    }

    /// Instance of some other class, reduced with no arguments
    pub fn object(&mut self, module: &str, name: &str) {
        self.global(module, name);
        self.op(b')');
        self.op(b'R');
        self.put();
    }

    pub fn none(&mut self) {
        self.op(b'N');
    }

    pub fn begin_list(&mut self) {
        self.op(b']');
        self.put();
        self.op(b'(');
    }

    pub fn end_list(&mut self) {
        self.op(b'e');
    }

    pub fn pair(&mut self, first: impl FnOnce(&mut Self), second: impl FnOnce(&mut Self)) {
        first(self);
        second(self);
        self.op(0x86);
        self.put();
    }

    fn block(&mut self, seed: f32) {
        self.op(b'}');
        self.put();
        self.op(b'(');
        for (i, param) in MLSTM_PARAMS.iter().enumerate() {
            self.unicode(param);
            self.array(&param_shape(param), seed + i as f32);
        }
        self.op(b'u');
    }
}

/// Value of flat element `i` of a [`NumpyPickler::array`]
pub fn numpy_element(seed: f32, i: usize) -> f32 {
    seed + i as f32 * 0.25
}

/// [`legacy_bundle`] with every array pickled as a NumPy `float32` array
pub fn numpy_bundle_bytes(dim: usize) -> Vec<u8> {
    let mut p = NumpyPickler::new();
    p.begin_list();
    p.array(&EMBED_SHAPE, 0.0);
    if dim == 64 || dim == 256 {
        for stack in 0..4 {
            p.block(stack as f32);
            if stack < 3 {
                p.none();
            }
        }
    } else {
        p.block(0.0);
    }
    p.pair(
        |p| p.array(&[dim, DENSE_OUT], 0.1),
        |p| p.array(&[DENSE_OUT], 0.2),
    );
    p.none();
    p.end_list();
    p.finish()
}

/// Write [`numpy_bundle_bytes`] for `dim` into `dir`
pub fn write_numpy_bundle(dir: &Path, dim: usize) -> PathBuf {
    let path = dir.join(format!("numpy_weights_{}.pkl", dim));
    std::fs::write(&path, numpy_bundle_bytes(dim)).expect("Failed to write bundle");
    path
}

/// Dispatcher whose every model size is served by the shared mock
pub fn mock_dispatcher(
    runtime: Arc<MockRuntime>,
    output_root: &Path,
) -> JobDispatcher<impl RuntimeProvider> {
    let provider = move |_size: ModelSize| -> unirep::Result<Box<dyn ModelRuntime>> {
        Ok(Box::new(runtime.clone()))
    };
    JobDispatcher::new(provider, output_root)
}
