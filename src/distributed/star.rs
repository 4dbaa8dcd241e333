use std::{collections::BTreeMap, net::SocketAddr};

use async_trait::async_trait;
use comms::{
    OnoReceiver, OnoSender,
    msg::{Command, Msg, Payload},
};
use futures::future::try_join_all;
use half::f16;
use log::debug;
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::{
        TcpListener, TcpStream,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
};

use super::{Collective, Compression, ROOT_RANK, collective::protocol_err};
use crate::{
    error::{OptimErr, Result},
    parameters::check_len,
};

/// A star collective over TCP streams.
pub type TcpStar = StarCollective<OwnedReadHalf, OwnedWriteHalf>;

struct Link<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    rx: OnoReceiver<R>,
    tx: OnoSender<W>,
}

enum Role<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    /// Links to ranks `1..world_size`, in rank order.
    Root(Vec<Link<R, W>>),
    Peer(Link<R, W>),
}

/// A collective where the root rank relays every operation.
///
/// Peers only talk to the root. Reductions are summed on the root in rank order, so
/// every run with the same inputs produces the same bits on every rank.
pub struct StarCollective<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    rank: usize,
    world_size: usize,
    role: Role<R, W>,
    buf: Vec<u32>,
}

impl<R, W> StarCollective<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    /// Creates the root end of a star, waiting for every peer to introduce itself.
    ///
    /// # Arguments
    /// * `links` - One reader and writer pair per peer, in any order.
    ///
    /// # Returns
    /// The root collective or an error if a peer's handshake is invalid.
    pub async fn root(links: Vec<(R, W)>) -> Result<Self> {
        let world_size = links.len() + 1;
        let mut buf = Vec::new();
        let mut by_rank = BTreeMap::new();

        for (rx, tx) in links {
            let (mut rx, tx) = comms::channel(rx, tx);

            let rank = match rx.recv_into(&mut buf).await.map_err(OptimErr::Collective)? {
                Msg::Control(Command::Hello {
                    rank,
                    world_size: theirs,
                }) if theirs == world_size && rank != ROOT_RANK && rank < world_size => rank,
                Msg::Control(Command::Hello { rank, world_size: theirs }) => {
                    return Err(protocol_err(format!(
                        "invalid hello from rank {rank} of {theirs}, the star has {world_size} ranks"
                    )));
                }
                other => return Err(unexpected("hello", &other)),
            };

            if by_rank.insert(rank, Link { rx, tx }).is_some() {
                return Err(protocol_err(format!("rank {rank} connected twice")));
            }

            debug!(rank = rank; "peer joined the star");
        }

        let mut peers: Vec<_> = by_rank.into_values().collect();
        let hello = Msg::Control(Command::Hello {
            rank: ROOT_RANK,
            world_size,
        });

        try_join_all(peers.iter_mut().map(|link| link.tx.send(&hello)))
            .await
            .map_err(OptimErr::Collective)?;

        Ok(Self {
            rank: ROOT_RANK,
            world_size,
            role: Role::Root(peers),
            buf,
        })
    }

    /// Creates a peer end of a star, introducing itself to the root.
    ///
    /// # Arguments
    /// * `rank` - This worker's rank, in `1..world_size`.
    /// * `world_size` - The amount of workers in the run.
    /// * `rx`, `tx` - The link to the root.
    pub async fn peer(rank: usize, world_size: usize, rx: R, tx: W) -> Result<Self> {
        if rank == ROOT_RANK || rank >= world_size {
            return Err(OptimErr::config(format!(
                "peer rank must be within 1..{world_size}, got {rank}"
            )));
        }

        let (mut rx, mut tx) = comms::channel(rx, tx);
        let mut buf = Vec::new();

        let hello = Msg::Control(Command::Hello { rank, world_size });
        tx.send(&hello).await.map_err(OptimErr::Collective)?;

        match rx.recv_into(&mut buf).await.map_err(OptimErr::Collective)? {
            Msg::Control(Command::Hello {
                rank: ROOT_RANK,
                world_size: theirs,
            }) if theirs == world_size => {}
            other => return Err(unexpected("hello from the root", &other)),
        }

        Ok(Self {
            rank,
            world_size,
            role: Role::Peer(Link { rx, tx }),
            buf,
        })
    }

    /// Tells the other end of every link that this rank is leaving and closes the links.
    pub async fn shutdown(&mut self) -> Result<()> {
        let msg = &Msg::Control(Command::Disconnect);

        let links: Vec<_> = match &mut self.role {
            Role::Root(peers) => peers.iter_mut().collect(),
            Role::Peer(root) => vec![root],
        };

        try_join_all(links.into_iter().map(|link| async move {
            link.tx.send(msg).await?;
            link.tx.close().await
        }))
        .await
        .map_err(OptimErr::Collective)?;

        debug!(rank = self.rank; "left the star");
        Ok(())
    }
}

impl TcpStar {
    /// Listens on `addr` and builds the root once `world_size - 1` peers connected.
    pub async fn bind_root(addr: SocketAddr, world_size: usize) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(OptimErr::Collective)?;

        let mut links = Vec::with_capacity(world_size.saturating_sub(1));

        while links.len() + 1 < world_size {
            let (stream, peer_addr) = listener.accept().await.map_err(OptimErr::Collective)?;
            debug!("accepted a star link from {peer_addr}");
            links.push(stream.into_split());
        }

        Self::root(links).await
    }

    /// Connects to the root listening at `addr`.
    pub async fn connect_peer(addr: SocketAddr, rank: usize, world_size: usize) -> Result<Self> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(OptimErr::Collective)?;

        let (rx, tx) = stream.into_split();
        Self::peer(rank, world_size, rx, tx).await
    }
}

fn unexpected(expected: &str, got: &Msg<'_>) -> OptimErr {
    match got {
        Msg::Err(e) => protocol_err(format!("the other end failed: {e}")),
        other => protocol_err(format!("expected {expected}, got a {} message", other.kind())),
    }
}

fn to_half(values: &[f32]) -> Vec<f16> {
    values.iter().copied().map(f16::from_f32).collect()
}

#[async_trait]
impl<R, W> Collective for StarCollective<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    fn rank(&self) -> usize {
        self.rank
    }

    fn world_size(&self) -> usize {
        self.world_size
    }

    async fn broadcast(&mut self, buf: &mut [f32]) -> Result<()> {
        match &mut self.role {
            Role::Root(peers) => {
                let msg = Msg::Data(Payload::Params(buf));
                try_join_all(peers.iter_mut().map(|link| link.tx.send(&msg)))
                    .await
                    .map_err(OptimErr::Collective)?;
            }
            Role::Peer(root) => {
                match root.rx.recv_into(&mut self.buf).await.map_err(OptimErr::Collective)? {
                    Msg::Data(Payload::Params(values)) => {
                        check_len("broadcast buffer", values.len(), buf.len())?;
                        buf.copy_from_slice(values);
                    }
                    other => return Err(unexpected("params", &other)),
                }
            }
        }

        debug!(rank = self.rank, len = buf.len(); "broadcast done");
        Ok(())
    }

    async fn broadcast_bytes(&mut self, bytes: &mut Vec<u8>) -> Result<()> {
        match &mut self.role {
            Role::Root(peers) => {
                let msg = Msg::Data(Payload::State(bytes));
                try_join_all(peers.iter_mut().map(|link| link.tx.send(&msg)))
                    .await
                    .map_err(OptimErr::Collective)?;
            }
            Role::Peer(root) => {
                match root.rx.recv_into(&mut self.buf).await.map_err(OptimErr::Collective)? {
                    Msg::Data(Payload::State(state)) => {
                        bytes.clear();
                        bytes.extend_from_slice(state);
                    }
                    other => return Err(unexpected("state", &other)),
                }
            }
        }

        debug!(rank = self.rank, len = bytes.len(); "byte broadcast done");
        Ok(())
    }

    async fn all_reduce(&mut self, buf: &mut [f32], compression: Compression) -> Result<()> {
        let world_size = self.world_size as f32;

        match &mut self.role {
            Role::Root(peers) => {
                let mut sum: Vec<f32> = match compression {
                    Compression::None => buf.to_vec(),
                    Compression::Fp16 => to_half(buf).into_iter().map(f16::to_f32).collect(),
                };

                // Peers are drained one after the other so the sum order is fixed.
                for link in peers.iter_mut() {
                    let msg = link
                        .rx
                        .recv_into(&mut self.buf)
                        .await
                        .map_err(OptimErr::Collective)?;

                    match (compression, msg) {
                        (Compression::None, Msg::Data(Payload::Grad(grad))) => {
                            check_len("gradient", grad.len(), sum.len())?;
                            sum.iter_mut().zip(grad).for_each(|(acc, g)| *acc += g);
                        }
                        (Compression::Fp16, Msg::Data(Payload::HalfGrad(grad))) => {
                            check_len("gradient", grad.len(), sum.len())?;
                            sum.iter_mut()
                                .zip(grad)
                                .for_each(|(acc, g)| *acc += g.to_f32());
                        }
                        (_, other) => return Err(unexpected("a gradient", &other)),
                    }
                }

                sum.iter_mut().for_each(|acc| *acc /= world_size);

                match compression {
                    Compression::None => {
                        let msg = Msg::Data(Payload::Grad(&sum));
                        try_join_all(peers.iter_mut().map(|link| link.tx.send(&msg)))
                            .await
                            .map_err(OptimErr::Collective)?;

                        buf.copy_from_slice(&sum);
                    }
                    Compression::Fp16 => {
                        let half = to_half(&sum);
                        let msg = Msg::Data(Payload::HalfGrad(&half));
                        try_join_all(peers.iter_mut().map(|link| link.tx.send(&msg)))
                            .await
                            .map_err(OptimErr::Collective)?;

                        buf.iter_mut()
                            .zip(&half)
                            .for_each(|(dst, h)| *dst = h.to_f32());
                    }
                }
            }
            Role::Peer(root) => {
                let sent = match compression {
                    Compression::None => root.tx.send(&Msg::Data(Payload::Grad(buf))).await,
                    Compression::Fp16 => {
                        let half = to_half(buf);
                        root.tx.send(&Msg::Data(Payload::HalfGrad(&half))).await
                    }
                };
                sent.map_err(OptimErr::Collective)?;

                match root.rx.recv_into(&mut self.buf).await.map_err(OptimErr::Collective)? {
                    Msg::Data(Payload::Grad(avg)) if compression == Compression::None => {
                        check_len("reduced gradient", avg.len(), buf.len())?;
                        buf.copy_from_slice(avg);
                    }
                    Msg::Data(Payload::HalfGrad(avg)) if compression == Compression::Fp16 => {
                        check_len("reduced gradient", avg.len(), buf.len())?;
                        buf.iter_mut()
                            .zip(avg)
                            .for_each(|(dst, h)| *dst = h.to_f32());
                    }
                    other => return Err(unexpected("a reduced gradient", &other)),
                }
            }
        }

        debug!(rank = self.rank, len = buf.len(); "all reduce done");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::{DuplexStream, ReadHalf, WriteHalf};

    use super::*;

    type DuplexStar = StarCollective<ReadHalf<DuplexStream>, WriteHalf<DuplexStream>>;

    async fn star(world_size: usize) -> Vec<DuplexStar> {
        let mut root_links = Vec::new();
        let mut peer_links = Vec::new();

        for _ in 1..world_size {
            let (a, b) = tokio::io::duplex(1 << 16);
            root_links.push(tokio::io::split(a));
            peer_links.push(tokio::io::split(b));
        }

        // The root must order its links by the announced ranks.
        root_links.reverse();

        let peers = peer_links
            .into_iter()
            .enumerate()
            .map(|(i, (rx, tx))| DuplexStar::peer(i + 1, world_size, rx, tx));

        let (root, peers) = tokio::join!(DuplexStar::root(root_links), try_join_all(peers));

        let mut all = vec![root.unwrap()];
        all.extend(peers.unwrap());
        all
    }

    async fn all_reduce(stars: &mut [DuplexStar], bufs: &mut [Vec<f32>], compression: Compression) {
        try_join_all(
            stars
                .iter_mut()
                .zip(bufs.iter_mut())
                .map(|(star, buf)| star.all_reduce(buf, compression)),
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn all_reduce_averages_on_every_rank() {
        let mut stars = star(3).await;
        let mut bufs: Vec<_> = (0..3)
            .map(|r| vec![r as f32, 1., 2. * r as f32])
            .collect();

        all_reduce(&mut stars, &mut bufs, Compression::None).await;

        for buf in &bufs {
            assert_eq!(buf, &[1., 1., 2.]);
        }
    }

    #[tokio::test]
    async fn fp16_all_reduce_is_rounded_to_half_precision() {
        let mut stars = star(3).await;
        let inputs: Vec<_> = (0..3).map(|r| vec![0.1 * (r + 1) as f32, 1e-3]).collect();
        let mut bufs = inputs.clone();

        all_reduce(&mut stars, &mut bufs, Compression::Fp16).await;

        let expected: Vec<f32> = (0..2)
            .map(|i| {
                let sum: f32 = inputs.iter().map(|buf| f16::from_f32(buf[i]).to_f32()).sum();
                f16::from_f32(sum / 3.).to_f32()
            })
            .collect();

        for buf in &bufs {
            assert_eq!(buf, &expected);
        }
    }

    #[tokio::test]
    async fn broadcasts_copy_the_root_values() {
        let mut stars = star(3).await;
        let mut bufs = vec![vec![1., 2., 3.], vec![0.; 3], vec![9.; 3]];
        let mut states = vec![b"root state".to_vec(), Vec::new(), b"stale".to_vec()];

        try_join_all(
            stars
                .iter_mut()
                .zip(bufs.iter_mut())
                .map(|(star, buf)| star.broadcast(buf)),
        )
        .await
        .unwrap();

        try_join_all(
            stars
                .iter_mut()
                .zip(states.iter_mut())
                .map(|(star, state)| star.broadcast_bytes(state)),
        )
        .await
        .unwrap();

        assert!(bufs.iter().all(|buf| buf == &[1., 2., 3.]));
        assert!(states.iter().all(|state| state == b"root state"));
        assert_eq!(
            stars.iter().map(|s| s.rank()).collect::<Vec<_>>(),
            [0, 1, 2]
        );
    }

    #[tokio::test]
    async fn handshake_rejects_mismatched_world_sizes() {
        let (a, b) = tokio::io::duplex(1 << 10);
        let (root_rx, root_tx) = tokio::io::split(a);
        let (peer_rx, peer_tx) = tokio::io::split(b);

        let (root, peer) = tokio::join!(
            DuplexStar::root(vec![(root_rx, root_tx)]),
            DuplexStar::peer(1, 3, peer_rx, peer_tx),
        );

        assert!(matches!(root, Err(OptimErr::Collective(_))));
        assert!(peer.is_err());
    }

    #[tokio::test]
    async fn operations_after_shutdown_fail() {
        let mut stars = star(2).await;
        stars[0].shutdown().await.unwrap();

        let mut buf = [0.; 2];
        assert!(matches!(
            stars[1].broadcast(&mut buf).await,
            Err(OptimErr::Collective(_))
        ));
    }
}
