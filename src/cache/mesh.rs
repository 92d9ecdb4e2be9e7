use crate::{cache::CacheArtifact, resources::mesh::MeshData};

/// Parsed OBJ and PLY meshes. Parsing takes no options.
impl CacheArtifact for MeshData {
    type Params = ();

    const KIND: &'static str = "mesh";
    const CACHE_VERSION: u32 = 1;

    fn params_tag(_: &()) -> String {
        "mesh".to_string()
    }
}
