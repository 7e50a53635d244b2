//! Yarn Plug'n'Play discovery.

use std::path::{Path, PathBuf};

use stylist_types::PnpConfiguration;

use crate::root_finder::{FindRootError, find_upward, is_file};

/// Register scripts, newest naming first.
const PNP_REGISTER_NAMES: [&str; 2] = [".pnp.cjs", ".pnp.js"];
const PNP_LOADER_NAME: &str = ".pnp.loader.mjs";

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PnpSearch {
    pub configuration: Option<PnpConfiguration>,
    /// Every path whose creation or change could alter `configuration`.
    pub probed: Vec<PathBuf>,
}

/// Find the PnP configuration governing `start`, if any.
pub async fn find_pnp_configuration(start: &Path) -> Result<PnpSearch, FindRootError> {
    let mut search = find_upward(start, &PNP_REGISTER_NAMES).await?;

    let Some(register_path) = search.found().map(Path::to_path_buf) else {
        return Ok(PnpSearch {
            configuration: None,
            probed: search.into_probed(),
        });
    };

    let loader_candidate = register_path.with_file_name(PNP_LOADER_NAME);
    search.push_probed(loader_candidate.clone());
    let loader_path = is_file(&loader_candidate)
        .await?
        .then_some(loader_candidate);

    Ok(PnpSearch {
        configuration: Some(PnpConfiguration::new(register_path, loader_path)),
        probed: search.into_probed(),
    })
}
