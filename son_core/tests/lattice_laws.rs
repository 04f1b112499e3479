//! Algebraic laws of the type lattice, checked over generated types.

use proptest::prelude::*;
use son_core::types::{Field, Ty, TypeTable};

#[derive(Debug, Clone)]
enum Recipe {
    Bottom,
    Top,
    Control,
    XControl,
    Int(i64, i64),
    FloatCon(f64),
    FloatBound(usize),
    Null,
    Ptr { nullable: bool, high: bool },
    StructTop,
    StructBot,
    Point { high: bool },
    Tuple(Box<Recipe>, Box<Recipe>),
    Mem(u8, Box<Recipe>),
}

fn leaf() -> impl Strategy<Value = Recipe> {
    prop_oneof![
        Just(Recipe::Bottom),
        Just(Recipe::Top),
        Just(Recipe::Control),
        Just(Recipe::XControl),
        (-4i64..=4, -4i64..=4).prop_map(|(a, b)| Recipe::Int(a, b)),
        prop_oneof![Just(0.0), Just(1.5), Just(2.5), Just(0.1), Just(-3.25)]
            .prop_map(Recipe::FloatCon),
        (0usize..4).prop_map(Recipe::FloatBound),
        Just(Recipe::Null),
        (any::<bool>(), any::<bool>()).prop_map(|(nullable, high)| Recipe::Ptr { nullable, high }),
        Just(Recipe::StructTop),
        Just(Recipe::StructBot),
        any::<bool>().prop_map(|high| Recipe::Point { high }),
    ]
}

fn recipe() -> impl Strategy<Value = Recipe> {
    leaf().prop_recursive(2, 8, 2, |inner| {
        prop_oneof![
            (inner.clone(), inner.clone())
                .prop_map(|(a, b)| Recipe::Tuple(Box::new(a), Box::new(b))),
            (0u8..4, inner).prop_map(|(a, t)| Recipe::Mem(a, Box::new(t))),
        ]
    })
}

struct Fixture {
    table: TypeTable,
    point: Ty,
    alias: u32,
}

impl Fixture {
    fn new() -> Self {
        let mut table = TypeTable::new();
        let ax = table.fresh_alias();
        let ay = table.fresh_alias();
        let point = table.struct_type(
            "Point",
            vec![
                Field {
                    name: "x".into(),
                    ty: Ty::INT_BOT,
                    alias: ax,
                    is_final: false,
                },
                Field {
                    name: "y".into(),
                    ty: Ty::F64,
                    alias: ay,
                    is_final: true,
                },
            ],
        );
        Fixture {
            table,
            point,
            alias: ax,
        }
    }

    fn build(&mut self, r: &Recipe) -> Ty {
        let t = &mut self.table;
        match r {
            Recipe::Bottom => Ty::BOTTOM,
            Recipe::Top => Ty::TOP,
            Recipe::Control => Ty::CONTROL,
            Recipe::XControl => Ty::XCONTROL,
            Recipe::Int(a, b) => t.int_range(*a, *b),
            Recipe::FloatCon(v) => t.float(*v),
            Recipe::FloatBound(i) => [Ty::F64, Ty::F32, Ty::F32_TOP, Ty::F64_TOP][*i],
            Recipe::Null => Ty::NULL,
            Recipe::Ptr { nullable, high } => {
                let p = t.ptr(self.point, *nullable);
                if *high {
                    t.dual(p)
                } else {
                    p
                }
            }
            Recipe::StructTop => Ty::STRUCT_TOP,
            Recipe::StructBot => Ty::STRUCT_BOT,
            Recipe::Point { high } => {
                if *high {
                    t.dual(self.point)
                } else {
                    self.point
                }
            }
            Recipe::Tuple(a, b) => {
                let a = self.build(a);
                let b = self.build(b);
                self.table.tuple(&[a, b])
            }
            Recipe::Mem(a, inner) => {
                let inner = self.build(inner);
                match a {
                    0 => self.table.meet(Ty::MEM_TOP, Ty::MEM_TOP),
                    1 => self.table.mem(self.alias, inner),
                    2 => self.table.mem(self.alias + 1, inner),
                    _ => Ty::MEM_BOT,
                }
            }
        }
    }
}

proptest! {
    #[test]
    fn meet_is_commutative(a in recipe(), b in recipe()) {
        let mut fx = Fixture::new();
        let (a, b) = (fx.build(&a), fx.build(&b));
        let ab = fx.table.meet(a, b);
        let ba = fx.table.meet(b, a);
        prop_assert_eq!(ab, ba);
    }

    #[test]
    fn meet_is_associative(a in recipe(), b in recipe(), c in recipe()) {
        let mut fx = Fixture::new();
        let (a, b, c) = (fx.build(&a), fx.build(&b), fx.build(&c));
        let ab = fx.table.meet(a, b);
        let ab_c = fx.table.meet(ab, c);
        let bc = fx.table.meet(b, c);
        let a_bc = fx.table.meet(a, bc);
        prop_assert_eq!(ab_c, a_bc);
    }

    #[test]
    fn meet_is_idempotent(a in recipe()) {
        let mut fx = Fixture::new();
        let a = fx.build(&a);
        prop_assert_eq!(fx.table.meet(a, a), a);
    }

    #[test]
    fn meet_never_narrows(a in recipe(), b in recipe()) {
        let mut fx = Fixture::new();
        let (a, b) = (fx.build(&a), fx.build(&b));
        let m = fx.table.meet(a, b);
        prop_assert!(fx.table.isa(a, m));
        prop_assert!(fx.table.isa(b, m));
    }

    #[test]
    fn dual_is_involution(a in recipe()) {
        let mut fx = Fixture::new();
        let a = fx.build(&a);
        let d = fx.table.dual(a);
        prop_assert_eq!(fx.table.dual(d), a);
    }

    #[test]
    fn join_is_upper_bound(a in recipe(), b in recipe()) {
        let mut fx = Fixture::new();
        let (a, b) = (fx.build(&a), fx.build(&b));
        let j = fx.table.join(a, b);
        prop_assert!(fx.table.isa(j, a));
        prop_assert!(fx.table.isa(j, b));
    }

    #[test]
    fn bottom_and_top_are_bounds(a in recipe()) {
        let mut fx = Fixture::new();
        let a = fx.build(&a);
        prop_assert_eq!(fx.table.meet(a, Ty::BOTTOM), Ty::BOTTOM);
        prop_assert_eq!(fx.table.meet(a, Ty::TOP), a);
    }
}
