// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Box tree basics.
//!
//! Build a tree of 2D boxes, move a few of them, then cull, query, pair up
//! and ray cast.
//!
//! Run:
//! - `RUST_LOG=debug cargo run -p understory_demos --example box_tree_basics`

use kurbo::{Point, Rect, Vec2};
use log::info;
use understory_box_tree::{BoxTree, Plane2D, Ray, rect_to_aabb};

fn main() {
    env_logger::init();

    let mut tree = BoxTree::new(true);
    let names = ["wall", "door", "crate", "lamp", "table", "chair"];
    let rects = [
        Rect::new(0.0, 0.0, 200.0, 10.0),
        Rect::new(80.0, 0.0, 120.0, 12.0),
        Rect::new(30.0, 40.0, 60.0, 70.0),
        Rect::new(150.0, 150.0, 160.0, 160.0),
        Rect::new(90.0, 90.0, 140.0, 120.0),
        Rect::new(130.0, 110.0, 145.0, 125.0),
    ];
    for (name, rect) in names.into_iter().zip(rects) {
        tree.add(name, &rect_to_aabb(rect));
    }
    tree.finalize();
    info!("built {} leaves in {} nodes", tree.len(), tree.nodes().len());

    // Nudge the chair: still inside its parent, so no restructuring is needed.
    tree.update("chair", &rect_to_aabb(Rect::new(131.0, 111.0, 144.0, 124.0)));
    // Throw the lamp across the room: the hierarchy gets refit.
    tree.update("lamp", &rect_to_aabb(Rect::new(10.0, 150.0, 20.0, 160.0)));
    tree.finalize();

    let mut hits = Vec::new();
    tree.overlapping_nodes(&rect_to_aabb(Rect::new(70.0, 0.0, 130.0, 100.0)), &mut hits);
    hits.sort_unstable();
    println!("in the doorway region: {hits:?}");

    let mut near = Vec::new();
    tree.circle_overlapping_nodes(Point::new(45.0, 55.0), 20.0, &mut near);
    println!("within 20 of (45, 55): {near:?}");

    let mut pairs = Vec::new();
    tree.overlapping_pairs(&mut pairs);
    println!("touching pairs: {pairs:?}");

    // A view covering the right half of the room.
    let planes = [Plane2D::through(Point::new(100.0, 0.0), Vec2::new(1.0, 0.0))];
    let mut visible = Vec::new();
    tree.visible_nodes(&planes, &mut visible);
    visible.sort_unstable();
    println!("visible from the right: {visible:?}");

    let ray = Ray::new(Point::new(0.0, 100.0), Vec2::new(1.0, 0.1), 1_000.0);
    let mut nearest = None;
    let factor = BoxTree::ray_test(&[&tree], &ray, |c| {
        nearest = Some(c.node);
        Some(c.distance)
    });
    if let Some(factor) = factor {
        let at = ray.at(factor);
        println!("ray hits {nearest:?} at ({:.1}, {:.1})", at.x, at.y);
    }
}
