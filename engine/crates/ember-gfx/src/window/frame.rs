use std::rc::Rc;

use ash::vk;

use crate::{
    commands::{fence::GfxFence, semaphore::GfxSemaphore},
    error::{GfxError, GfxResult},
    foundation::device::GfxDevice,
};

/// host 最多领先 GPU 的帧数
pub const FRAME_LAG: usize = 2;

/// 长度为 [`FRAME_LAG`] 的环，每一帧使用其中一个 slot
pub struct FrameSlots<T> {
    slots: Vec<T>,
    current: usize,
}

impl<T> FrameSlots<T> {
    pub fn new(mut f: impl FnMut(usize) -> GfxResult<T>) -> GfxResult<Self> {
        let slots = (0..FRAME_LAG).map(&mut f).collect::<GfxResult<Vec<_>>>()?;
        Ok(Self { slots, current: 0 })
    }

    #[inline]
    pub fn current_index(&self) -> usize {
        self.current
    }

    #[inline]
    pub fn current(&self) -> &T {
        &self.slots[self.current]
    }

    #[inline]
    pub fn get(&self, slot: usize) -> &T {
        &self.slots[slot]
    }

    #[inline]
    pub fn advance(&mut self) {
        self.current = (self.current + 1) % FRAME_LAG;
    }
}

/// 一帧的上下文，在 begin_frame 和 end_frame 之间传递
///
/// `frame_slot` 是 [`FrameSlots`] 中的位置，`image_index` 是 swapchain image 的序号，
/// 两者没有关系：slot 数量固定为 [`FRAME_LAG`]，swapchain image 数量由 surface 决定
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FrameContext {
    pub frame_slot: usize,
    pub image_index: u32,
}

/// 用于限制 host 领先 GPU 帧数的 fence
pub trait ThrottleFence {
    /// 阻塞直到 signaled
    fn wait(&self) -> GfxResult<()>;
    fn reset(&self) -> GfxResult<()>;
}

impl ThrottleFence for GfxFence {
    #[inline]
    fn wait(&self) -> GfxResult<()> {
        self.wait_forever()
    }

    #[inline]
    fn reset(&self) -> GfxResult<()> {
        GfxFence::reset(self)
    }
}

/// 一个 frame slot 拥有的同步对象
pub struct FrameSync {
    /// acquire image 时 signal
    pub image_available: GfxSemaphore,
    /// 绘制命令执行完成时 signal，present 等待它
    pub render_complete: GfxSemaphore,
    /// 创建时就是 signaled，第一帧不会阻塞
    pub in_flight: GfxFence,
}

impl FrameSync {
    pub fn new(device: &Rc<GfxDevice>, slot: usize) -> GfxResult<Self> {
        Ok(Self {
            image_available: GfxSemaphore::new(device, &format!("frame-{}-image-available", slot))?,
            render_complete: GfxSemaphore::new(device, &format!("frame-{}-render-complete", slot))?,
            in_flight: GfxFence::new(device, true, &format!("frame-{}-in-flight", slot))?,
        })
    }
}

impl ThrottleFence for FrameSync {
    #[inline]
    fn wait(&self) -> GfxResult<()> {
        self.in_flight.wait_forever()
    }

    #[inline]
    fn reset(&self) -> GfxResult<()> {
        self.in_flight.reset()
    }
}

/// 帧节奏控制：保证 host 最多领先 GPU [`FRAME_LAG`] 帧
///
/// 同时记录每个 swapchain image 最近被哪个 slot 使用，
/// 避免 image 对应的 command buffer 仍在执行时被重新录制
pub struct FramePacer<S: ThrottleFence> {
    slots: FrameSlots<S>,
    images_in_flight: Vec<Option<usize>>,
    frame_id: u64,
}

// new & init
impl<S: ThrottleFence> FramePacer<S> {
    pub fn new(slots: FrameSlots<S>, image_count: usize) -> Self {
        Self {
            slots,
            images_in_flight: vec![None; image_count],
            frame_id: 0,
        }
    }

    /// swapchain 重建之后调用
    pub fn reset_images(&mut self, image_count: usize) {
        self.images_in_flight = vec![None; image_count];
    }
}

// getters
impl<S: ThrottleFence> FramePacer<S> {
    #[inline]
    pub fn current_slot(&self) -> usize {
        self.slots.current_index()
    }

    #[inline]
    pub fn slot(&self, slot: usize) -> &S {
        self.slots.get(slot)
    }

    #[inline]
    pub fn frame_id(&self) -> u64 {
        self.frame_id
    }
}

// update
impl<S: ThrottleFence> FramePacer<S> {
    /// 等待当前 slot 上一次的提交执行完成
    ///
    /// fence 的 reset 推迟到 [`Self::claim_image`]，acquire 失败时 fence 仍保持 signaled
    pub fn wait_slot(&self) -> GfxResult<usize> {
        let _span = tracy_client::span!("FramePacer::wait_slot");
        let slot = self.slots.current_index();
        self.slots.current().wait()?;
        Ok(slot)
    }

    /// acquire 成功之后调用：等待仍在使用该 image 的其他 slot，然后 reset 当前 slot 的 fence
    pub fn claim_image(&mut self, image_index: u32) -> GfxResult<FrameContext> {
        let slot = self.slots.current_index();
        let tracked = self.images_in_flight.len();
        let owner = self.images_in_flight.get_mut(image_index as usize).ok_or_else(|| {
            GfxError::Window(format!("acquired image {} but only {} images are tracked", image_index, tracked))
        })?;
        match *owner {
            Some(previous) if previous != slot => self.slots.get(previous).wait()?,
            _ => (),
        }
        *owner = Some(slot);
        self.slots.current().reset()?;

        Ok(FrameContext {
            frame_slot: slot,
            image_index,
        })
    }

    /// 提交之后调用
    pub fn advance(&mut self) {
        self.slots.advance();
        self.frame_id = self.frame_id.wrapping_add(1);
    }
}

/// 一帧的提交描述：在 COLOR_ATTACHMENT_OUTPUT 等待 acquire semaphore，执行完成后 signal render complete
#[derive(Debug)]
pub struct FrameSubmit<'a, S> {
    pub wait: &'a S,
    pub wait_stage: vk::PipelineStageFlags,
    pub signal: &'a S,
}

impl<'a, S> FrameSubmit<'a, S> {
    /// 只有写入 swapchain image 时才需要等待 image 可用
    pub const WAIT_STAGE: vk::PipelineStageFlags = vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT;

    #[inline]
    pub fn new(image_available: &'a S, render_complete: &'a S) -> Self {
        Self {
            wait: image_available,
            wait_stage: Self::WAIT_STAGE,
            signal: render_complete,
        }
    }
}

impl<'a> FrameSubmit<'a, GfxSemaphore> {
    #[inline]
    pub fn from_sync(sync: &'a FrameSync) -> Self {
        Self::new(&sync.image_available, &sync.render_complete)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};

    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Op {
        Wait(usize),
        Reset(usize),
    }

    /// 模拟 GPU：fence 在 submit 之后变为 pending，wait 会让 GPU 完成这一帧
    struct MockFence {
        slot: usize,
        pending: Cell<bool>,
        log: Rc<RefCell<Vec<Op>>>,
    }

    impl ThrottleFence for MockFence {
        fn wait(&self) -> GfxResult<()> {
            self.pending.set(false);
            self.log.borrow_mut().push(Op::Wait(self.slot));
            Ok(())
        }

        fn reset(&self) -> GfxResult<()> {
            assert!(!self.pending.get(), "reset a fence that is still in flight");
            self.log.borrow_mut().push(Op::Reset(self.slot));
            Ok(())
        }
    }

    fn mock_pacer(image_count: usize) -> (FramePacer<MockFence>, Rc<RefCell<Vec<Op>>>) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let slots = FrameSlots::new(|slot| {
            Ok(MockFence {
                slot,
                pending: Cell::new(false),
                log: log.clone(),
            })
        })
        .unwrap();
        (FramePacer::new(slots, image_count), log)
    }

    fn in_flight(pacer: &FramePacer<MockFence>) -> usize {
        (0..FRAME_LAG).filter(|slot| pacer.slot(*slot).pending.get()).count()
    }

    #[test]
    fn test_frame_slots_ring() {
        let mut slots = FrameSlots::new(|i| Ok(i * 10)).unwrap();
        assert_eq!(*slots.current(), 0);
        slots.advance();
        assert_eq!(*slots.current(), 10);
        slots.advance();
        assert_eq!(slots.current_index(), 0);
    }

    #[test]
    fn test_host_never_more_than_frame_lag_ahead() {
        let (mut pacer, log) = mock_pacer(3);

        for frame in 0..10u32 {
            let slot = pacer.wait_slot().unwrap();
            let ctx = pacer.claim_image(frame % 3).unwrap();
            assert_eq!(ctx.frame_slot, slot);

            // submit
            pacer.slot(slot).pending.set(true);
            assert!(in_flight(&pacer) <= FRAME_LAG);
            pacer.advance();
        }
        assert_eq!(pacer.frame_id(), 10);

        // 每个 slot 在 reset 之前都被 wait 过
        let log = log.borrow();
        for (i, op) in log.iter().enumerate() {
            if let Op::Reset(slot) = op {
                assert!(log[..i].iter().rev().any(|o| *o == Op::Wait(*slot)));
            }
        }
    }

    #[test]
    fn test_slot_fence_waited_before_reuse() {
        let (mut pacer, log) = mock_pacer(2);

        for frame in 0..4u32 {
            let slot = pacer.wait_slot().unwrap();
            pacer.claim_image(frame % 2).unwrap();
            pacer.slot(slot).pending.set(true);
            pacer.advance();
        }

        let log = log.borrow();
        assert_eq!(log[0], Op::Wait(0));
        assert_eq!(log[1], Op::Reset(0));
        assert_eq!(log[2], Op::Wait(1));
        assert_eq!(log[3], Op::Reset(1));
        // 第三帧重新使用 slot 0，必须先等待 slot 0 上一次的提交
        assert_eq!(log[4], Op::Wait(0));
    }

    #[test]
    fn test_image_in_flight_waits_other_slot() {
        let (mut pacer, log) = mock_pacer(3);

        // slot 0 使用 image 2
        pacer.wait_slot().unwrap();
        pacer.claim_image(2).unwrap();
        pacer.slot(0).pending.set(true);
        pacer.advance();

        // slot 1 也拿到了 image 2，需要等待 slot 0
        log.borrow_mut().clear();
        pacer.wait_slot().unwrap();
        pacer.claim_image(2).unwrap();
        assert_eq!(*log.borrow(), vec![Op::Wait(1), Op::Wait(0), Op::Reset(1)]);
        assert!(!pacer.slot(0).pending.get());
    }

    #[test]
    fn test_reset_images_forgets_history() {
        let (mut pacer, log) = mock_pacer(2);
        pacer.wait_slot().unwrap();
        pacer.claim_image(1).unwrap();
        pacer.advance();

        pacer.reset_images(4);
        log.borrow_mut().clear();
        pacer.wait_slot().unwrap();
        pacer.claim_image(1).unwrap();
        assert_eq!(*log.borrow(), vec![Op::Wait(1), Op::Reset(1)]);
    }

    #[test]
    fn test_untracked_image_index_is_error() {
        let (mut pacer, log) = mock_pacer(2);
        pacer.wait_slot().unwrap();
        assert!(matches!(pacer.claim_image(2), Err(GfxError::Window(_))));
        // 出错时不会 reset fence
        assert_eq!(*log.borrow(), vec![Op::Wait(0)]);

        pacer.reset_images(3);
        assert!(pacer.claim_image(2).is_ok());
    }

    #[test]
    fn test_frame_submit_waits_at_color_attachment_output() {
        let (acquire, draw) = (1u32, 2u32);
        let submit = FrameSubmit::new(&acquire, &draw);
        assert_eq!(submit.wait_stage, vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT);
        assert_eq!(*submit.wait, 1);
        assert_eq!(*submit.signal, 2);
    }
}
