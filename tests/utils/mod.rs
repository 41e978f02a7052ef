use ark_ff::PrimeField;
use ark_std::rand::Rng;
use starmpc::algebra::{ClearVec, ShareVec};
use starmpc::{
    ChannelStar, Circuit, Dealer, OfflineCircuit, PartyNode, ProtocolError, ProtocolParams,
    TapeReader, ThresholdSharing,
};
use std::io::Cursor;

pub type Outputs<F> = Vec<(String, ClearVec<F>)>;

/// Secret-shares a vector of (possibly missing) values; row `p` of the
/// result is party `p`'s share vector, with missing values kept missing.
pub fn deal_inputs<F: PrimeField, R: Rng>(
    params: &ProtocolParams,
    values: &[Option<F>],
    rng: &mut R,
) -> Vec<ShareVec<F>> {
    let sharing = ThresholdSharing::new(params.n_parties, params.threshold).unwrap();
    let mut per_party = vec![Vec::with_capacity(values.len()); params.n_parties];
    for value in values {
        match value {
            Some(v) => {
                for (party, share) in sharing.share(*v, rng).into_iter().enumerate() {
                    per_party[party].push(Some(share));
                }
            }
            None => per_party.iter_mut().for_each(|row| row.push(None)),
        }
    }
    per_party
}

/// Runs the offline phase into in-memory tapes, then spawns one task per
/// party over an in-process star and drives both online passes. Every
/// party's outputs must agree; returns them along with each party's count of
/// consumed tape lines.
pub async fn run_protocol<F: PrimeField>(
    params: ProtocolParams,
    mut offline: OfflineCircuit<F>,
    circuits: Vec<Circuit<F>>,
) -> Result<(Outputs<F>, Vec<usize>), ProtocolError> {
    tracing_subscriber::fmt().with_test_writer().try_init().ok();

    let mut rng = ark_std::test_rng();
    let mut dealer = Dealer::from_writers(&params, vec![Vec::new(); params.n_parties])?;
    offline.run_offline(&mut dealer, &mut rng)?;
    let tapes = dealer.into_writers();

    let endpoints = ChannelStar::star(params.n_parties);
    let mut handles = Vec::new();
    for (id, (transport, (tape, mut circuit))) in endpoints
        .into_iter()
        .zip(tapes.into_iter().zip(circuits))
        .enumerate()
    {
        let params = params.clone();
        handles.push(tokio::spawn(async move {
            let reader = TapeReader::new(id, Cursor::new(tape));
            let mut node = PartyNode::new(id, params, reader, transport)?;
            circuit.read_offline(&mut node)?;
            circuit.run_online(&mut node).await?;
            let outputs = circuit.output_values().expect("endpoints were evaluated");
            Ok::<_, ProtocolError>((outputs, node.tape_lines_read()))
        }));
    }

    let mut agreed: Option<Outputs<F>> = None;
    let mut lines = Vec::new();
    for handle in handles {
        let (outputs, read) = handle.await.expect("party task panicked")?;
        match &agreed {
            Some(previous) => assert_eq!(previous, &outputs, "parties disagree on the outputs"),
            None => agreed = Some(outputs),
        }
        lines.push(read);
    }
    Ok((agreed.unwrap_or_default(), lines))
}
