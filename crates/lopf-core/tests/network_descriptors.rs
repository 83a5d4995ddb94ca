use lopf_core::{
    activity_mask, get_activity_mask, get_switchable_as_dense, ActivityMask, Bus, ComponentType,
    Generator, Line, LopfError, Network, StorageUnit, Store, TopologyGraph,
};

fn planning_network() -> Network {
    let mut network = Network::new();
    network.name = "planning".into();
    network.set_snapshots(2);
    network.buses.push(Bus::new("a"));
    network.buses.push(Bus::new("b"));
    network
        .generators
        .push(Generator::new("coal", "a").with_p_nom(100.0).with_lifecycle(2000, 35.0));
    network
        .generators
        .push(Generator::new("solar", "b").extendable(500.0).with_lifecycle(2030, 25.0));
    network.lines.push(Line::new("ab", "a", "b", 0.2, 50.0));
    network.set_investment_periods(&[2030, 2040]).unwrap();
    network
}

#[test]
fn mask_matches_lifetime_window_for_every_cell() {
    let network = planning_network();
    let sns = network.all_snapshots();
    let mask = get_activity_mask(&network, ComponentType::Generator, &sns, None).unwrap();
    assert_eq!(mask.shape(), (4, 2));

    for (r, &sn) in sns.iter().enumerate() {
        let period = network.snapshots[sn].period.unwrap();
        for (c, gen) in network.generators.iter().enumerate() {
            let expected = gen.build_year <= period
                && (period as f64) < gen.build_year as f64 + gen.lifetime;
            assert_eq!(*mask.get(r, c), expected, "snapshot {sn}, {}", gen.name);
        }
    }
    // coal retires in 2035
    assert_eq!(mask.column(0).filter(|v| **v).count(), 2);
}

#[test]
fn extendable_subset_mask_is_scoped() {
    let network = planning_network();
    let subset = network.get_extendable_i(ComponentType::Generator);
    let sns = network.all_snapshots();
    let mask = activity_mask(&network, ComponentType::Generator, &sns, Some(&subset), true)
        .unwrap();
    match mask {
        ActivityMask::Mask(table) => {
            assert_eq!(table.columns(), &["solar".to_string()]);
            assert_eq!(table.count_true(), 4);
        }
        ActivityMask::Always => panic!("multi-period mode must produce a mask"),
    }
}

#[test]
fn resolver_is_indifferent_to_storage_kind() {
    let mut network = planning_network();
    network
        .storage_units
        .push(StorageUnit::new("hydro", "a", 20.0, 10.0));
    network
        .set_series(ComponentType::StorageUnit, "inflow", "hydro", vec![0.0, 0.0, 5.0, 0.0])
        .unwrap();
    let inflow = get_switchable_as_dense(
        &network,
        ComponentType::StorageUnit,
        "inflow",
        &[2, 3],
        None,
    )
    .unwrap();
    assert_eq!(inflow.rows(), &[2, 3]);
    assert_eq!(inflow.column(0).copied().collect::<Vec<_>>(), vec![5.0, 0.0]);

    let cost = get_switchable_as_dense(
        &network,
        ComponentType::StorageUnit,
        "marginal_cost",
        &[2, 3],
        None,
    )
    .unwrap();
    assert_eq!(cost.shape(), inflow.shape());
}

#[test]
fn unknown_attribute_names_component_type() {
    let network = planning_network();
    let err = get_switchable_as_dense(&network, ComponentType::Line, "efficiency", &[0], None)
        .unwrap_err();
    assert!(matches!(err, LopfError::Data(_)));
    assert!(err.to_string().contains("Line"));
}

#[test]
fn network_deserializes_with_defaults() {
    let json = r#"{
        "name": "from-json",
        "buses": [{"name": "a"}, {"name": "b", "v_nom": 380.0}],
        "generators": [{"name": "gas", "bus": "a", "p_nom": 40.0, "marginal_cost": 60.0}],
        "loads": [{"name": "city", "bus": "b", "p_set": 30.0}],
        "lines": [{"name": "ab", "bus0": "a", "bus1": "b", "x": 0.1, "s_nom": 100.0}],
        "snapshots": [{"period": null, "timestep": "t0", "weightings": {"objective": 2.0, "stores": 2.0, "generators": 2.0}}]
    }"#;
    let network: Network = serde_json::from_str(json).unwrap();
    assert_eq!(network.buses[0].v_nom, 1.0);
    assert_eq!(network.buses[1].v_nom, 380.0);
    assert!(network.generators[0].p_nom_max.is_infinite());
    assert_eq!(network.generators[0].p_max_pu, 1.0);
    assert_eq!(network.lines[0].s_max_pu, 1.0);
    assert_eq!(network.snapshots[0].weightings.objective, 2.0);
    assert!(network.validate().is_ok());
}

#[test]
fn unbounded_attributes_survive_a_json_round_trip() {
    let mut network = planning_network();
    network.stores.push(Store::new("battery", "b", 20.0));
    network
        .storage_units
        .push(StorageUnit::new("hydro", "a", 10.0, 6.0));

    let json = serde_json::to_string(&network).unwrap();
    let back: Network = serde_json::from_str(&json).unwrap();
    assert_eq!(back.generators[1].lifetime, 25.0);
    assert!(back.generators[1].p_nom_max.is_infinite());
    assert!(back.lines[0].s_nom_max.is_infinite());
    assert!(back.lines[0].lifetime.is_infinite());
    assert!(back.stores[0].e_nom_max.is_infinite());
    assert!(back.storage_units[0].p_nom_max.is_infinite());
    assert_eq!(back.all_snapshots(), network.all_snapshots());
}

#[test]
fn radial_network_has_no_cycles() {
    let network = planning_network();
    let topo = TopologyGraph::build(&network, |_| true);
    assert!(topo.cycle_basis().is_empty());
    assert_eq!(topo.sub_networks().len(), 1);
}
