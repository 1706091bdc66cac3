//! Positional layout of the legacy pickled weight bundle
//!
//! The bundle is a top-level list whose meaning is purely positional. All of
//! that knowledge lives in one table so a change upstream touches one place.

/// Names of the nine parameters of one mLSTM block, in the order the
/// runtime's checkpoints list them
pub const MLSTM_PARAMS: [&str; 9] = ["wx", "wh", "wmx", "wmh", "b", "gx", "gh", "gmx", "gmh"];

/// Field to position mapping for one version of the bundle format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LegacyBundleSchema {
    pub version: u32,
    /// Index of the embedding matrix
    pub embedding_index: usize,
    /// Distance from the end of the list to the `(weights, biases)` dense pair
    pub dense_from_end: usize,
    /// Position of the weight matrix inside the dense pair
    pub dense_weights_slot: usize,
    /// Position of the bias vector inside the dense pair
    pub dense_biases_slot: usize,
    /// Dimensions whose model stacks several mLSTM blocks
    pub stacked_dims: &'static [usize],
    /// `(list index, stack label)` for every block of a stacked model
    pub stacked_blocks: &'static [(usize, usize)],
    /// List index of the block of a single-block model
    pub single_block: usize,
    pub params: &'static [&'static str],
}

/// Bundle layout produced by the original UniRep training code
pub const LEGACY_BUNDLE_V1: LegacyBundleSchema = LegacyBundleSchema {
    version: 1,
    embedding_index: 0,
    dense_from_end: 2,
    dense_weights_slot: 0,
    dense_biases_slot: 1,
    stacked_dims: &[64, 256],
    stacked_blocks: &[(1, 0), (3, 1), (5, 2), (7, 3)],
    single_block: 1,
    params: &MLSTM_PARAMS,
};

pub const EMBEDDING_FILE: &str = "embed_matrix:0.npy";
pub const DENSE_BIASES_FILE: &str = "fully_connected_biases:0.npy";
pub const DENSE_WEIGHTS_FILE: &str = "fully_connected_weights:0.npy";

/// One mLSTM block to extract: where it sits in the bundle and how its files are named
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockLayout {
    pub index: usize,
    /// Stack label for stacked models, `None` for the single-block model
    pub stack: Option<usize>,
}

impl BlockLayout {
    pub fn file_name(&self, param: &str) -> String {
        match self.stack {
            Some(label) => format!(
                "rnn_mlstm_stack_mlstm_stack{label}_mlstm_stack{label}_{param}:0.npy"
            ),
            None => format!("rnn_mlstm_mlstm_{param}:0.npy"),
        }
    }
}

impl LegacyBundleSchema {
    pub fn is_stacked(&self, dim: usize) -> bool {
        self.stacked_dims.contains(&dim)
    }

    /// Blocks to extract for a model of the given dimensionality
    pub fn blocks(&self, dim: usize) -> Vec<BlockLayout> {
        if self.is_stacked(dim) {
            self.stacked_blocks
                .iter()
                .map(|&(index, label)| BlockLayout {
                    index,
                    stack: Some(label),
                })
                .collect()
        } else {
            vec![BlockLayout {
                index: self.single_block,
                stack: None,
            }]
        }
    }

    /// Index of the dense pair in a bundle of `len` entries
    pub fn dense_index(&self, len: usize) -> Option<usize> {
        len.checked_sub(self.dense_from_end)
    }

    /// Every file name the runtime loads for a model of this dimensionality
    pub fn expected_files(&self, dim: usize) -> Vec<String> {
        let mut files = vec![
            EMBEDDING_FILE.to_string(),
            DENSE_BIASES_FILE.to_string(),
            DENSE_WEIGHTS_FILE.to_string(),
        ];
        for block in self.blocks(dim) {
            files.extend(self.params.iter().map(|p| block.file_name(p)));
        }
        files
    }

    /// Name of the directory the runtime expects the files in
    pub fn directory_name(&self, dim: usize) -> String {
        format!("{}_weights", dim)
    }
}
