use kvtree_core::{Error, UnpackField, UnpackKind, text, unpack_into};

const BLOCK: usize = 64;

fn table() -> [UnpackField<'static>; 8] {
    [
        UnpackField::fixed("speed", Some("1.5"), UnpackKind::Float, 0),
        UnpackField::fixed("origin", None, UnpackKind::Vector, 4),
        UnpackField::fixed("tint", Some("255 0 0 255"), UnpackKind::VectorColor, 16),
        UnpackField::fixed("count", None, UnpackKind::Int, 28),
        UnpackField::fixed("uv", Some("0.5 0.25"), UnpackKind::TwoFloats, 32),
        UnpackField::fixed("rect", None, UnpackKind::FourFloats, 40),
        UnpackField::variable("name", Some("anon"), UnpackKind::String, 56, 8),
        UnpackField::END,
    ]
}

fn f32_at(block: &[u8], offset: usize) -> f32 {
    f32::from_ne_bytes(block[offset..offset + 4].try_into().unwrap())
}

fn i32_at(block: &[u8], offset: usize) -> i32 {
    i32::from_ne_bytes(block[offset..offset + 4].try_into().unwrap())
}

fn floats_at<const N: usize>(block: &[u8], offset: usize) -> [f32; N] {
    std::array::from_fn(|i| f32_at(block, offset + i * 4))
}

#[test]
fn every_kind_lands_at_its_offset() {
    let tree = text::parse(
        "ent",
        r#""ent"
        {
            "speed"  "3.25"
            "origin" "1 2 3"
            "tint"   "0 51 255 255"
            "count"  "42"
            "uv"     "1 -1"
            "rect"   "0 0 640 480"
            "name"   "player"
        }"#,
    )
    .unwrap();
    let mut block = [0xEEu8; BLOCK];
    unpack_into(tree.root_node(), &table(), &mut block).unwrap();

    assert_eq!(f32_at(&block, 0), 3.25);
    assert_eq!(floats_at::<3>(&block, 4), [1.0, 2.0, 3.0]);
    assert_eq!(floats_at::<3>(&block, 16), [0.0, 0.2, 1.0]);
    assert_eq!(i32_at(&block, 28), 42);
    assert_eq!(floats_at::<2>(&block, 32), [1.0, -1.0]);
    assert_eq!(floats_at::<4>(&block, 40), [0.0, 0.0, 640.0, 480.0]);
    assert_eq!(&block[56..64], b"player\0\0");
}

#[test]
fn defaults_fill_missing_keys_and_others_are_untouched() {
    let tree = text::parse("ent", r#""ent" { "count" 7 }"#).unwrap();
    let mut block = [0xEEu8; BLOCK];
    unpack_into(tree.root_node(), &table(), &mut block).unwrap();

    assert_eq!(f32_at(&block, 0), 1.5);
    assert_eq!(floats_at::<3>(&block, 16), [1.0, 0.0, 0.0]);
    assert_eq!(i32_at(&block, 28), 7);
    assert_eq!(floats_at::<2>(&block, 32), [0.5, 0.25]);
    assert_eq!(&block[56..64], b"anon\0\0\0\0");
    // no key and no default
    assert!(block[4..16].iter().all(|&b| b == 0xEE));
    assert!(block[40..56].iter().all(|&b| b == 0xEE));
}

#[test]
fn short_float_lists_zero_fill() {
    let tree = text::parse("ent", r#""ent" { "origin" "1 2" "rect" "1 2 x 4" }"#).unwrap();
    let mut block = [0xEEu8; BLOCK];
    unpack_into(tree.root_node(), &table(), &mut block).unwrap();
    assert_eq!(floats_at::<3>(&block, 4), [0.0; 3]);
    assert_eq!(floats_at::<4>(&block, 40), [0.0; 4]);
}

#[test]
fn long_strings_are_truncated_and_terminated() {
    let tree = text::parse("ent", r#""ent" { "name" "a_very_long_name" }"#).unwrap();
    let mut block = [0u8; BLOCK];
    unpack_into(tree.root_node(), &table(), &mut block).unwrap();
    assert_eq!(&block[56..64], b"a_very_\0");
}

#[test]
fn table_stops_at_end_marker() {
    let tree = text::parse("ent", r#""ent" { "speed" 2 "count" 9 }"#).unwrap();
    let fields = [
        UnpackField::fixed("speed", None, UnpackKind::Float, 0),
        UnpackField::END,
        UnpackField::fixed("count", None, UnpackKind::Int, 100),
    ];
    let mut block = [0u8; 4];
    unpack_into(tree.root_node(), &fields, &mut block).unwrap();
    assert_eq!(f32_at(&block, 0), 2.0);
}

#[test]
fn overruns_are_rejected_before_writing() {
    let tree = text::parse("ent", r#""ent" { "speed" 2 "origin" "1 2 3" }"#).unwrap();
    let fields = [
        UnpackField::fixed("speed", None, UnpackKind::Float, 0),
        UnpackField::fixed("origin", None, UnpackKind::Vector, 8),
        UnpackField::END,
    ];
    let mut block = [0u8; 16];
    let err = unpack_into(tree.root_node(), &fields, &mut block).unwrap_err();
    assert!(matches!(err, Error::Unpack(_)), "{err}");
    assert_eq!(block, [0u8; 16]);

    let sizeless = [UnpackField::fixed("name", None, UnpackKind::String, 0), UnpackField::END];
    assert!(unpack_into(tree.root_node(), &sizeless, &mut block).is_err());
}

#[repr(C)]
struct Particle {
    life: f32,
    velocity: [f32; 3],
    frames: i32,
}

#[test]
fn fills_a_repr_c_struct() {
    let tree = text::parse(
        "p",
        r#""particle" { "life" 0.75 "velocity" "0 9.5 -1" "frames" 12 }"#,
    )
    .unwrap();
    let fields = [
        UnpackField::fixed("life", None, UnpackKind::Float, std::mem::offset_of!(Particle, life)),
        UnpackField::fixed(
            "velocity",
            None,
            UnpackKind::Vector,
            std::mem::offset_of!(Particle, velocity),
        ),
        UnpackField::fixed("frames", None, UnpackKind::Int, std::mem::offset_of!(Particle, frames)),
        UnpackField::END,
    ];
    let mut bytes = [0u8; std::mem::size_of::<Particle>()];
    unpack_into(tree.root_node(), &fields, &mut bytes).unwrap();

    let p = Particle {
        life: f32_at(&bytes, std::mem::offset_of!(Particle, life)),
        velocity: floats_at::<3>(&bytes, std::mem::offset_of!(Particle, velocity)),
        frames: i32_at(&bytes, std::mem::offset_of!(Particle, frames)),
    };
    assert_eq!(p.life, 0.75);
    assert_eq!(p.velocity, [0.0, 9.5, -1.0]);
    assert_eq!(p.frames, 12);
}
