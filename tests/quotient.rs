// Copyright 2024 Cornell University
// released under BSD 3-Clause License
// author: Kevin Laeufer <laeufer@cornell.edu>

use prosyn::check::{
    CompareOp, Property, Settings, Specification, ValueIteration,
};
use prosyn::family::{Family, Hole};
use prosyn::model::{Mdp, MdpBuilder};
use prosyn::quotient::{Coloring, Quotient};

/// Two holes: `x` picks the branch at the initial state, `y` picks the coin
/// bias in both branches. Member values for P(F "goal"):
/// (0,0) = 0.2, (0,1) = 0.4, (1,0) = 0.6, (1,1) = 0.8.
fn branch_mdp() -> Mdp {
    let mut b = MdpBuilder::new();
    let s0 = b.add_state();
    let s1 = b.add_state();
    let s2 = b.add_state();
    let goal = b.add_state();
    let sink = b.add_state();
    b.add_choice(s0, &[(s1, 1.0)]); // c0: x=0
    b.add_choice(s0, &[(s2, 1.0)]); // c1: x=1
    b.add_choice(s1, &[(goal, 0.2), (sink, 0.8)]); // c2: y=0
    b.add_choice(s1, &[(goal, 0.4), (sink, 0.6)]); // c3: y=1
    b.add_choice(s2, &[(goal, 0.6), (sink, 0.4)]); // c4: y=0
    b.add_choice(s2, &[(goal, 0.8), (sink, 0.2)]); // c5: y=1
    b.add_choice(goal, &[(goal, 1.0)]); // c6
    b.add_choice(sink, &[(sink, 1.0)]); // c7
    b.label(goal, "goal");
    b.build().unwrap()
}

fn branch_holes() -> Vec<Hole> {
    vec![
        Hole::new("x", vec!["left".into(), "right".into()]),
        Hole::new("y", vec!["safe".into(), "risky".into()]),
    ]
}

fn branch_coloring(mdp: &Mdp, holes: &[Hole]) -> Coloring {
    let assignments = vec![
        vec![(0, 0)],
        vec![(0, 1)],
        vec![(1, 0)],
        vec![(1, 1)],
        vec![(1, 0)],
        vec![(1, 1)],
        vec![],
        vec![],
    ];
    Coloring::new(mdp, holes, assignments).unwrap()
}

fn branch_quotient(spec: Specification) -> Quotient {
    let mdp = branch_mdp();
    let holes = branch_holes();
    let coloring = branch_coloring(&mdp, &holes);
    Quotient::new(
        mdp,
        holes,
        coloring,
        spec,
        Box::new(ValueIteration::default()),
    )
    .unwrap()
}

fn geq_half() -> Specification {
    Specification::new(
        vec![Property::probability(CompareOp::Geq, 0.5, "goal")],
        None,
        Settings::default(),
    )
}

#[test]
fn serialize_branch_quotient() {
    let mdp = branch_mdp();
    insta::assert_snapshot!(mdp.to_string().trim_end(), @r"
    mdp 5 states 8 choices initial 0
    state 0
      -> 1:1.000
      -> 2:1.000
    state 1
      -> 3:0.200 4:0.800
      -> 3:0.400 4:0.600
    state 2
      -> 3:0.600 4:0.400
      -> 3:0.800 4:0.200
    state 3 {goal}
      -> 3:1.000
    state 4
      -> 4:1.000
    ");
}

#[test]
fn restriction_invariants_hold() {
    let quotient = branch_quotient(geq_half());
    let root = quotient.root_family();
    let mut family = root.fork();
    family.set_options(1, &[1]);

    // I1: family options shrink relative to the root
    for h in 0..family.num_holes() {
        for o in family.options(h) {
            assert!(root.hole(h).contains(*o));
        }
    }

    let coloring = quotient.coloring();
    let (_, mask) = coloring.select_choices(&family);
    for choice in 0..quotient.mdp().num_choices() {
        let enabled = coloring
            .assignment_of(choice)
            .iter()
            .all(|ho| family.hole(ho.hole as usize).contains(ho.option as usize));
        if mask[choice] {
            // I2: selected choices only use options inside the family
            assert!(coloring.is_default(choice) || enabled);
        } else {
            // I3: every enabled non-default choice is selected
            assert!(!enabled || coloring.is_default(choice));
        }
    }
}

#[test]
fn build_attaches_restricted_mdp() {
    let quotient = branch_quotient(geq_half());
    let mut family = quotient.root_family();
    family.set_options(1, &[0]);
    quotient.build(&mut family).unwrap();
    let sub = family.sub.as_ref().unwrap();
    // all states retained, y=1 choices dropped
    assert_eq!(sub.mdp.num_states(), 5);
    assert_eq!(sub.mdp.num_choices(), 6);
    assert_eq!(sub.state_map, vec![0, 1, 2, 3, 4]);
    assert_eq!(sub.choice_map, vec![0, 1, 2, 4, 6, 7]);
}

#[test]
fn singleton_chains_have_the_expected_values() {
    let quotient = branch_quotient(geq_half());
    let root = quotient.root_family();
    let values = [[0.2, 0.4], [0.6, 0.8]];
    for x in 0..2 {
        for y in 0..2 {
            let singleton = root.assignment_family(&[x, y]);
            let (result, _) = quotient.check_assignment(&singleton, None).unwrap();
            let entry = result.constraints.results[0].as_ref().unwrap();
            assert!(
                (entry.value - values[x][y]).abs() < 1e-6,
                "member ({x},{y}) has value {}",
                entry.value
            );
        }
    }
}

#[test]
fn family_display_reads_like_an_assignment() {
    let root = Family::new(branch_holes());
    let member = root.assignment_family(&[1, 0]);
    assert_eq!(member.to_string(), "[x=right, y=safe]");
}

#[test]
fn specification_display() {
    let spec = geq_half();
    assert_eq!(spec.to_string(), "P >= 0.5 [F \"goal\"]");
}
