use glam::Vec3;
use kestrel_vat::atlas::{AtlasImage, VatAtlas, VatMeta};
use kestrel_vat::decoder::{decode_normal, decode_position, oct_encode, AtlasCoord};

fn meta(frame_count: u32, store_delta: bool, normals_compressed: bool) -> VatMeta {
    VatMeta {
        vertex_count: 2,
        frame_count,
        fps: 24.0,
        tex_width: frame_count,
        tex_height: 2,
        columns: 1,
        frame_stride: frame_count,
        store_delta,
        normals_compressed,
    }
}

/// Vertex `row` at frame `f` sits at (f, 2f, row).
fn positions(meta: &VatMeta) -> AtlasImage {
    let mut image = AtlasImage::filled(meta.tex_width, meta.tex_height, [0.0; 4]);
    for row in 0..meta.tex_height {
        for frame in 0..meta.frame_count {
            let f = frame as f32;
            image.set_texel(frame, row, [f, 2.0 * f, row as f32, 1.0]);
        }
    }
    image
}

#[test]
fn integer_frames_read_exact_texels() {
    let meta = meta(4, false, false);
    let atlas = VatAtlas::new(meta, positions(&meta), None).expect("atlas");
    let coord = AtlasCoord::for_vertex(&meta, 1);
    for frame in 0..4 {
        let f = frame as f32;
        assert_eq!(decode_position(&atlas, coord, Vec3::ZERO, f), Vec3::new(f, 2.0 * f, 1.0));
    }
}

#[test]
fn fractional_frames_interpolate_between_neighbours() {
    let meta = meta(4, false, false);
    let atlas = VatAtlas::new(meta, positions(&meta), None).expect("atlas");
    let coord = AtlasCoord::for_vertex(&meta, 0);
    let p = decode_position(&atlas, coord, Vec3::ZERO, 1.5);
    assert!((p - Vec3::new(1.5, 3.0, 0.0)).length() < 1e-5);
    // past the last frame clamps instead of wrapping
    assert_eq!(decode_position(&atlas, coord, Vec3::ZERO, 9.0), Vec3::new(3.0, 6.0, 0.0));
}

#[test]
fn delta_atlases_offset_the_rest_pose() {
    let absolute = meta(4, false, false);
    let delta = meta(4, true, false);
    let rest = Vec3::new(10.0, 0.0, -1.0);
    let abs_atlas = VatAtlas::new(absolute, positions(&absolute), None).expect("atlas");
    let delta_atlas = VatAtlas::new(delta, positions(&delta), None).expect("atlas");
    let coord = AtlasCoord::for_vertex(&absolute, 0);
    assert_eq!(decode_position(&abs_atlas, coord, rest, 2.0), Vec3::new(2.0, 4.0, 0.0));
    assert_eq!(decode_position(&delta_atlas, coord, rest, 2.0), Vec3::new(12.0, 4.0, -1.0));
}

#[test]
fn single_frame_atlas_is_static() {
    let meta = meta(1, false, false);
    let atlas = VatAtlas::new(meta, positions(&meta), None).expect("atlas");
    let coord = AtlasCoord::for_vertex(&meta, 1);
    for frame in [0.0, 0.5, 3.0] {
        assert_eq!(decode_position(&atlas, coord, Vec3::ZERO, frame), Vec3::new(0.0, 0.0, 1.0));
    }
}

#[test]
fn compressed_normals_decode_from_their_octahedral_pair() {
    let meta = meta(2, false, true);
    let mut normals = AtlasImage::filled(2, 2, [0.5, 0.5, 0.0, 1.0]);
    let x = oct_encode(Vec3::X);
    normals.set_texel(1, 0, [x.x, x.y, 0.0, 1.0]);
    let atlas = VatAtlas::new(meta, positions(&meta), Some(normals)).expect("atlas");
    let coord = AtlasCoord::for_vertex(&meta, 0);
    assert!((decode_normal(&atlas, coord, 0.0) - Vec3::Z).length() < 1e-5);
    assert!((decode_normal(&atlas, coord, 1.0) - Vec3::X).length() < 1e-5);
    let halfway = decode_normal(&atlas, coord, 0.5);
    assert!((halfway.length() - 1.0).abs() < 1e-5);
    assert!((halfway - Vec3::new(1.0, 0.0, 1.0).normalize()).length() < 1e-4);
}

#[test]
fn missing_or_degenerate_normals_point_up() {
    let meta = meta(2, false, false);
    let atlas = VatAtlas::new(meta, positions(&meta), None).expect("atlas");
    let coord = AtlasCoord::for_vertex(&meta, 0);
    assert_eq!(decode_normal(&atlas, coord, 0.7), Vec3::Y);

    let zeros = AtlasImage::filled(2, 2, [0.0; 4]);
    let atlas = VatAtlas::new(meta, positions(&meta), Some(zeros)).expect("atlas");
    assert_eq!(decode_normal(&atlas, coord, 1.0), Vec3::Y);
}

#[test]
fn atlas_rejects_mismatched_images() {
    let meta = meta(2, false, false);
    let wrong = AtlasImage::filled(3, 2, [0.0; 4]);
    assert!(VatAtlas::new(meta, wrong, None).is_err());
    assert_eq!(AtlasCoord::for_vertex(&meta, 1).to_array(), [0.0, 0.75]);
}
