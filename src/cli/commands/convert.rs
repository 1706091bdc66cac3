use clap::Args;
use std::path::PathBuf;

use crate::cli::output::*;
use crate::core::job::ModelSize;
use crate::weights::WeightConverter;
use crate::UniRepError;

#[derive(Args, Debug)]
pub struct ConvertArgs {
    /// Legacy pickled weight bundle
    #[arg(value_name = "PKL")]
    pub bundle: PathBuf,

    /// Directory to create the `{dim}_weights` directory in
    #[arg(short, long, value_name = "DIR")]
    pub output: PathBuf,

    /// Fail unless the bundle is for this model size
    #[arg(short = 'm', long)]
    pub model_size: Option<ModelSize>,
}

pub fn run(args: ConvertArgs) -> anyhow::Result<()> {
    let converter = WeightConverter::new();

    if let Some(size) = args.model_size {
        let inferred = converter.inspect(&args.bundle)?;
        if inferred != size.dim() {
            return Err(UniRepError::WeightShapeMismatch {
                declared: size.dim(),
                inferred,
            }
            .into());
        }
    }

    action(&format!("Converting {}", args.bundle.display()));
    let converted = converter.convert_into(&args.bundle, &args.output)?;
    success(&format!(
        "Wrote {} files for the {}-dimensional model",
        converted.files().len(),
        converted.dim()
    ));
    tree_item(true, "Directory", Some(&converted.dir().display().to_string()));
    Ok(())
}
