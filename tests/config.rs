use kestrel_vat::config::{PlaybackModeKind, VatConfig, VatConfigOverrides};
use kestrel_vat::instance_state::TriggerPolicy;
use std::fs;

#[test]
fn config_file_resolves_asset_paths_against_its_directory() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("vat.json");
    fs::write(
        &path,
        r#"{
            "atlas": { "meta": "bake/meta.json", "positions": "bake/pos.exr" },
            "mesh": { "path": "/abs/model.glb" },
            "playback": { "mode": "manual", "ratio": 0.25 },
            "instancing": { "count": 64, "seed": 3 },
            "trigger": { "mode": "level", "radius": 0.2 }
        }"#,
    )
    .expect("write");
    let config = VatConfig::load(&path).expect("load");
    let atlas = config.atlas.as_ref().expect("atlas");
    assert_eq!(atlas.meta, dir.path().join("bake/meta.json"));
    assert_eq!(atlas.positions, dir.path().join("bake/pos.exr"));
    assert!(atlas.normals.is_none());
    assert_eq!(config.mesh.path.as_deref(), Some(std::path::Path::new("/abs/model.glb")));
    assert_eq!(config.playback.mode, PlaybackModeKind::Manual);
    assert_eq!(config.playback.manual_ratio(), Some(0.25));
    assert_eq!(config.instancing.count, 64);
    assert!(matches!(config.trigger, TriggerPolicy::Level { radius, .. } if radius == 0.2));
}

#[test]
fn broken_or_missing_config_falls_back_to_defaults() {
    let dir = tempfile::tempdir().expect("tempdir");
    let broken = dir.path().join("broken.json");
    fs::write(&broken, "{ not json").expect("write");
    assert!(VatConfig::load(&broken).is_err());
    assert_eq!(VatConfig::load_or_default(&broken), VatConfig::default());
    assert_eq!(VatConfig::load_or_default(dir.path().join("missing.json")), VatConfig::default());
}

#[test]
fn shipped_config_parses() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/config/vat.json");
    let mut config = VatConfig::load(path).expect("shipped config");
    assert!(config.atlas.is_none());
    assert_eq!(config.shader.user_slots, VatConfig::default().shader.user_slots);
    config.apply_overrides(&VatConfigOverrides { single: true, count: Some(5), ..Default::default() });
    assert!(!config.instancing.enabled);
    assert_eq!(config.instancing.count, 5);
}
